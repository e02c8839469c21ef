//! Extracts manufacturer/product/serial strings from USB string
//! descriptors. HID devices hand these back as UTF-16LE; non-Latin-1
//! code units are dropped rather than failing the whole string, mirroring
//! `OptionalData`'s tolerant string handling in the original firmware.

/// Decodes a USB string descriptor (`bLength`, `bDescriptorType`,
/// UTF-16LE payload) into a lossy Latin-1 `String`.
///
/// `buf[0]` is `bLength` (the whole descriptor's byte length, including
/// the 2-byte header), `buf[1]` is `bDescriptorType` (ignored — callers
/// only hand this function string descriptors). Code units above
/// `0x00FF` have no Latin-1 representation and are skipped; a trailing
/// odd byte (an incomplete code unit) is also skipped.
pub fn decode_device_string_descriptor(buf: &[u8]) -> String {
    if buf.len() < 2 {
        return String::new();
    }
    let len = (buf[0] as usize).clamp(2, buf.len());
    decode_utf16le_latin1(&buf[2..len])
}

/// Decodes a bare length-prefixed UTF-16LE run with no descriptor header:
/// `buf[0]` is the byte length of the string payload that follows.
pub fn decode_device_string(buf: &[u8]) -> String {
    if buf.is_empty() {
        return String::new();
    }
    let len = (buf[0] as usize).min(buf.len().saturating_sub(1));
    decode_utf16le_latin1(&buf[1..1 + len])
}

fn decode_utf16le_latin1(units: &[u8]) -> String {
    let mut out = String::with_capacity(units.len() / 2);
    for pair in units.chunks_exact(2) {
        let code = u16::from_le_bytes([pair[0], pair[1]]);
        if code <= 0xFF {
            out.push(code as u8 as char);
        } else {
            log::debug!("non-Latin-1 code unit 0x{code:04x} dropped from device string");
        }
    }
    out
}
