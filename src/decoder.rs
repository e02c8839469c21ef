//! Decodes an incoming HID input report against a [`FieldBinding`]
//! table, scaling each matched field to a physical `f64` and writing it
//! into a [`Status`].

use crate::binding::FieldBinding;
use crate::error::DecodeError;
use crate::status::Status;

/// Decodes reports against a previously-parsed binding table. Stateless
/// beyond the `report_id_present` flag — the bindings and the `Status`
/// it writes into are passed in per call.
#[derive(Debug, Clone, Copy)]
pub struct ReportDecoder {
    /// Whether reports carry a leading report-ID byte. UPS-class devices
    /// always do; real report-ID-0 devices are not observed in this
    /// fleet but the flag is here for that future (§9).
    pub report_id_present: bool,
}

impl Default for ReportDecoder {
    fn default() -> Self {
        ReportDecoder { report_id_present: true }
    }
}

impl ReportDecoder {
    pub fn new(report_id_present: bool) -> Self {
        ReportDecoder { report_id_present }
    }

    /// `payload` is the raw HID input report as delivered on the
    /// interrupt IN endpoint: byte 0 is the report ID (if
    /// `report_id_present`), the rest is field data.
    pub fn decode(&self, bindings: &[FieldBinding], payload: &[u8], status: &Status) -> Result<(), DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::EmptyReport);
        }

        let (id, data) = if self.report_id_present {
            (payload[0], &payload[1..])
        } else {
            (0, payload)
        };

        for binding in bindings.iter().filter(|b| b.report_id == id) {
            if binding.logical_max == binding.logical_min {
                // Already warned once at bind time in parser.rs.
                log::trace!("{}: degenerate logical range, skipping field", binding.name);
                continue;
            }
            let Some(raw) = extract_bits(data, binding.bit_offset, binding.bit_width) else {
                log::warn!(
                    "{}: bit range {}..{} exceeds {} byte payload, skipping field",
                    binding.name,
                    binding.bit_offset,
                    binding.bit_offset + binding.bit_width,
                    data.len()
                );
                continue;
            };

            let value = if binding.is_boolean() {
                raw as f64
            } else {
                let signed_raw = if binding.signed {
                    sign_extend(raw, binding.bit_width)
                } else {
                    raw as i64
                };
                scale(signed_raw, binding)
            };

            status.update_field(binding.key, value, binding.is_boolean());
        }

        Ok(())
    }
}

/// Extracts `bit_width` bits starting at `bit_offset` from `data`,
/// LSB-first within each byte, little-endian across bytes (HID
/// convention). Returns `None` if the range runs past `data`.
fn extract_bits(data: &[u8], bit_offset: u32, bit_width: u32) -> Option<u64> {
    if bit_width == 0 || bit_width > 64 {
        return None;
    }
    if (bit_offset as u64) + (bit_width as u64) > (data.len() as u64) * 8 {
        return None;
    }

    let mut raw: u64 = 0;
    let mut byte_idx = (bit_offset / 8) as usize;
    let mut bit_idx = bit_offset % 8;
    for i in 0..bit_width {
        let bit = (data[byte_idx] >> bit_idx) & 0x1;
        raw |= (bit as u64) << i;
        bit_idx += 1;
        if bit_idx == 8 {
            bit_idx = 0;
            byte_idx += 1;
        }
    }
    Some(raw)
}

/// Sign-extends a `bit_width`-wide raw value to `i64` using its top bit.
fn sign_extend(raw: u64, bit_width: u32) -> i64 {
    if bit_width >= 64 {
        return raw as i64;
    }
    let shift = 64 - bit_width;
    ((raw << shift) as i64) >> shift
}

/// `phys = (raw - logicalMin) * (physicalMax - physicalMin) / (logicalMax
/// - logicalMin) + physicalMin`, then scaled by `10^unitExponent`.
fn scale(raw: i64, binding: &FieldBinding) -> f64 {
    let logical_min = binding.logical_min as f64;
    let logical_max = binding.logical_max as f64;
    let physical_min = binding.physical_min as f64;
    let physical_max = binding.physical_max as f64;

    let phys = (raw as f64 - logical_min) * (physical_max - physical_min) / (logical_max - logical_min)
        + physical_min;
    phys * 10f64.powi(binding.unit_exponent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BATTERY_SYSTEM_PAGE, REMAINING_CAPACITY_USAGE, RUNTIME_TO_EMPTY_USAGE};
    use proptest::prelude::*;

    fn capacity_binding() -> FieldBinding {
        FieldBinding {
            key: (BATTERY_SYSTEM_PAGE, REMAINING_CAPACITY_USAGE),
            name: "Remaining Capacity",
            report_id: 1,
            bit_offset: 0,
            bit_width: 8,
            logical_min: 0,
            logical_max: 100,
            physical_min: 0,
            physical_max: 100,
            unit_exponent: 0,
            signed: false,
        }
    }

    #[test]
    fn decodes_capacity_report() {
        let status = Status::new();
        let decoder = ReportDecoder::default();
        let bindings = vec![capacity_binding()];
        decoder.decode(&bindings, &[0x01, 75], &status).unwrap();
        let v = status.remaining_capacity();
        assert!(v.used);
        assert_eq!(v.value, 75.0);
    }

    #[test]
    fn boolean_field_decodes_to_zero_or_one() {
        let binding = FieldBinding {
            key: (BATTERY_SYSTEM_PAGE, 0xD0),
            name: "AC Present",
            report_id: 2,
            bit_offset: 0,
            bit_width: 1,
            logical_min: 0,
            logical_max: 1,
            physical_min: 0,
            physical_max: 1,
            unit_exponent: 0,
            signed: false,
        };
        let status = Status::new();
        let decoder = ReportDecoder::default();
        decoder.decode(&[binding.clone()], &[0x02, 0x01], &status).unwrap();
        assert_eq!(status.field((BATTERY_SYSTEM_PAGE, 0xD0)).value, 1.0);
        assert!(status.field((BATTERY_SYSTEM_PAGE, 0xD0)).is_boolean);
        decoder.decode(&[binding], &[0x02, 0x00], &status).unwrap();
        assert_eq!(status.field((BATTERY_SYSTEM_PAGE, 0xD0)).value, 0.0);
    }

    #[test]
    fn runtime_with_unit_exponent_zero() {
        let binding = FieldBinding {
            key: (BATTERY_SYSTEM_PAGE, RUNTIME_TO_EMPTY_USAGE),
            name: "Runtime To Empty",
            report_id: 3,
            bit_offset: 0,
            bit_width: 16,
            logical_min: 0,
            logical_max: 65535,
            physical_min: 0,
            physical_max: 65535,
            unit_exponent: 0,
            signed: false,
        };
        let status = Status::new();
        let decoder = ReportDecoder::default();
        // little-endian 0x0E10 = 3600
        decoder.decode(&[binding], &[0x03, 0x10, 0x0E], &status).unwrap();
        assert_eq!(status.field((BATTERY_SYSTEM_PAGE, RUNTIME_TO_EMPTY_USAGE)).value, 3600.0);
    }

    #[test]
    fn unit_exponent_scales_down() {
        let binding = FieldBinding {
            key: (BATTERY_SYSTEM_PAGE, REMAINING_CAPACITY_USAGE),
            name: "Remaining Capacity",
            report_id: 1,
            bit_offset: 0,
            bit_width: 8,
            logical_min: 0,
            logical_max: 100,
            physical_min: 0,
            physical_max: 100,
            unit_exponent: -2,
            signed: false,
        };
        let status = Status::new();
        let decoder = ReportDecoder::default();
        decoder.decode(&[binding], &[0x01, 50], &status).unwrap();
        assert_eq!(status.field((BATTERY_SYSTEM_PAGE, REMAINING_CAPACITY_USAGE)).value, 0.5);
    }

    #[test]
    fn report_with_unknown_id_is_dropped_silently() {
        let status = Status::new();
        let decoder = ReportDecoder::default();
        let bindings = vec![capacity_binding()];
        decoder.decode(&bindings, &[0x04, 0xFF], &status).unwrap();
        assert!(!status.remaining_capacity().used);
    }

    #[test]
    fn empty_report_is_an_error() {
        let status = Status::new();
        let decoder = ReportDecoder::default();
        assert_eq!(decoder.decode(&[], &[], &status), Err(DecodeError::EmptyReport));
    }

    #[test]
    fn bit_extraction_round_trip() {
        // Pack a known raw value at a given offset, then recover it.
        let mut buf = [0u8; 4];
        let bit_offset = 5;
        let bit_width = 10;
        let raw: u64 = 0b11_0101_0011;
        for i in 0..bit_width {
            if (raw >> i) & 1 == 1 {
                let bitpos = bit_offset + i;
                buf[(bitpos / 8) as usize] |= 1 << (bitpos % 8);
            }
        }
        assert_eq!(extract_bits(&buf, bit_offset, bit_width), Some(raw));
    }

    #[test]
    fn signed_extension_matches_spec_examples() {
        assert_eq!(sign_extend(0xFF, 8), -1);
        assert_eq!(sign_extend(0x80, 8), -128);
        assert_eq!(sign_extend(0x7F, 8), 127);
    }

    #[test]
    fn out_of_range_bits_are_skipped_not_fatal() {
        let binding = FieldBinding {
            key: (BATTERY_SYSTEM_PAGE, REMAINING_CAPACITY_USAGE),
            name: "Remaining Capacity",
            report_id: 1,
            bit_offset: 100, // well past a 1-byte payload
            bit_width: 8,
            logical_min: 0,
            logical_max: 100,
            physical_min: 0,
            physical_max: 100,
            unit_exponent: 0,
            signed: false,
        };
        let status = Status::new();
        let decoder = ReportDecoder::default();
        decoder.decode(&[binding], &[0x01, 0xAA], &status).unwrap();
        assert!(!status.remaining_capacity().used);
    }

    proptest! {
        /// Packing then extracting any `bit_width`-wide value at any
        /// `bit_offset` within a fixed-size buffer recovers it exactly.
        #[test]
        fn bit_extraction_round_trips_for_any_offset_and_width(
            bit_width in 1u32..=32,
            bit_offset in 0u32..64,
            raw in 0u64..u32::MAX as u64,
        ) {
            let raw = raw & ((1u64 << bit_width) - 1);
            let mut buf = [0u8; 16];
            prop_assume!((bit_offset as u64) + (bit_width as u64) <= (buf.len() as u64) * 8);
            for i in 0..bit_width {
                if (raw >> i) & 1 == 1 {
                    let bitpos = bit_offset + i;
                    buf[(bitpos / 8) as usize] |= 1 << (bitpos % 8);
                }
            }
            prop_assert_eq!(extract_bits(&buf, bit_offset, bit_width), Some(raw));
        }

        /// Sign-extending an `i32` packed into `32` bits and read back
        /// through `sign_extend` is the identity.
        #[test]
        fn sign_extend_32_bit_is_identity(value: i32) {
            let raw = value as u32 as u64;
            prop_assert_eq!(sign_extend(raw, 32), value as i64);
        }
    }
}
