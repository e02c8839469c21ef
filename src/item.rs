//! Walks a HID report descriptor byte stream and emits typed short-form
//! items. Long items are consumed and skipped; they never contribute
//! state (HID 1.11 §6.2.2.3).

use power_device_hid_tags::{ItemPrefix, LONG_ITEM_PREFIX};

use crate::error::ParseError;

/// One item read off the descriptor stream.
#[derive(Debug, Clone, Copy)]
pub enum RawItem<'a> {
    Short {
        prefix: ItemPrefix,
        payload: &'a [u8],
        /// byte offset of the prefix byte, for diagnostics.
        offset: usize,
    },
    /// A long item (prefix `0xFE`). The parser ignores these entirely.
    Long { offset: usize },
}

/// Lazy, non-restartable walk over a report descriptor's bytes.
pub struct ItemStream<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ItemStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ItemStream { data, pos: 0 }
    }
}

impl<'a> Iterator for ItemStream<'a> {
    type Item = Result<RawItem<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }

        let offset = self.pos;
        let b = self.data[self.pos];

        if b == LONG_ITEM_PREFIX {
            // bDataSize, bLongItemTag, then bDataSize bytes of payload.
            if self.pos + 2 > self.data.len() {
                return Some(Err(ParseError::TruncatedDescriptor { offset }));
            }
            let data_size = self.data[self.pos + 1] as usize;
            let end = self.pos + 2 + data_size;
            if end > self.data.len() {
                return Some(Err(ParseError::TruncatedDescriptor { offset }));
            }
            self.pos = end;
            return Some(Ok(RawItem::Long { offset }));
        }

        let prefix = ItemPrefix(b);
        let len = prefix.payload_len();
        let start = self.pos + 1;
        let end = start + len;
        if end > self.data.len() {
            return Some(Err(ParseError::TruncatedDescriptor { offset }));
        }

        self.pos = end;
        Some(Ok(RawItem::Short {
            prefix,
            payload: &self.data[start..end],
            offset,
        }))
    }
}

/// Reads `bytes` little-endian, zero-extending to `u32`.
pub fn to_unsigned(bytes: &[u8]) -> u32 {
    match bytes.len() {
        0 => 0,
        1 => bytes[0] as u32,
        2 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
        4 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        n => {
            // Only 0/1/2/4 occur on the wire; anything else is a caller bug.
            log::warn!("to_unsigned called with unsupported payload length {n}");
            0
        }
    }
}

/// Reads `bytes` little-endian, sign-extending from the top bit of the
/// last byte. This is the semantically correct reading of HID signed
/// values; see DESIGN.md for why the original firmware's version of
/// this function was wrong.
pub fn to_signed(bytes: &[u8]) -> i32 {
    match bytes.len() {
        0 => 0,
        1 => bytes[0] as i8 as i32,
        2 => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        4 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        n => {
            log::warn!("to_signed called with unsupported payload length {n}");
            0
        }
    }
}
