//! Consumes an [`ItemStream`] plus [`GlobalState`]/[`LocalState`] and
//! builds the [`FieldBinding`] table for the watched Power Device usages.

use std::collections::HashMap;
use std::convert::TryFrom;

use power_device_hid_tags::{GlobalItemKind, LocalItemKind, MainItemKind};

use crate::binding::{is_watched, watched_name, FieldBinding};
use crate::error::ParseError;
use crate::item::{to_signed, to_unsigned, ItemStream, RawItem};
use crate::state::{normalize_unit_exponent, GlobalState, LocalState};

/// Default guard against unreasonably large descriptors (§4.2).
pub const DEFAULT_MAX_DESCRIPTOR_LEN: usize = 4096;

/// Bounded depth for the Global state Push/Pop stack.
const MAX_STACK_DEPTH: usize = 8;

/// Tunable limits for [`DescriptorParser`].
#[derive(Debug, Clone, Copy)]
pub struct ParserConfig {
    pub max_descriptor_len: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            max_descriptor_len: DEFAULT_MAX_DESCRIPTOR_LEN,
        }
    }
}

/// Walks a report descriptor once and resolves the watched usages into
/// [`FieldBinding`]s. Pure CPU, non-blocking, never suspends — safe to
/// run directly on a USB callback (§5).
#[derive(Debug, Default)]
pub struct DescriptorParser {
    config: ParserConfig,
}

impl DescriptorParser {
    pub fn new(config: ParserConfig) -> Self {
        DescriptorParser { config }
    }

    pub fn parse(&self, descriptor: &[u8]) -> Result<Vec<FieldBinding>, ParseError> {
        if descriptor.len() > self.config.max_descriptor_len {
            return Err(ParseError::DescriptorTooLarge {
                len: descriptor.len(),
                max: self.config.max_descriptor_len,
            });
        }

        let mut global = GlobalState::default();
        let mut local = LocalState::default();
        let mut stack: Vec<GlobalState> = Vec::new();
        let mut bit_cursor: HashMap<u8, u32> = HashMap::new();
        let mut bindings: Vec<FieldBinding> = Vec::new();
        let mut collection_depth: i32 = 0;

        for item in ItemStream::new(descriptor) {
            match item? {
                RawItem::Long { offset } => {
                    log::warn!("unsupported long item at offset {offset}, skipping");
                }
                RawItem::Short { prefix, payload, offset } => {
                    use power_device_hid_tags::ItemType;
                    match prefix.item_type() {
                        ItemType::Global => {
                            self.apply_global(&mut global, &mut stack, prefix.tag(), payload, offset)?;
                        }
                        ItemType::Local => {
                            apply_local(&mut local, prefix.tag(), payload);
                        }
                        ItemType::Main => {
                            self.apply_main(
                                prefix.tag(),
                                &global,
                                &local,
                                &mut bit_cursor,
                                &mut bindings,
                                &mut collection_depth,
                            );
                            local.reset();
                        }
                        ItemType::Reserved => {
                            log::warn!("reserved item type at offset {offset}, skipping");
                        }
                    }
                }
            }
        }

        if collection_depth != 0 {
            log::trace!("descriptor ended with {collection_depth} unclosed collection(s)");
        }

        Ok(bindings)
    }

    fn apply_global(
        &self,
        global: &mut GlobalState,
        stack: &mut Vec<GlobalState>,
        tag: u8,
        payload: &[u8],
        offset: usize,
    ) -> Result<(), ParseError> {
        let kind = match GlobalItemKind::try_from(tag) {
            Ok(k) => k,
            Err(()) => {
                log::warn!("unknown global item tag {tag:#x} at offset {offset}, ignoring");
                return Ok(());
            }
        };
        match kind {
            GlobalItemKind::UsagePage => global.usage_page = Some(to_unsigned(payload) as u16),
            GlobalItemKind::LogicalMin => global.logical_min = Some(to_signed(payload)),
            GlobalItemKind::LogicalMax => global.logical_max = Some(to_signed(payload)),
            GlobalItemKind::PhysicalMin => global.physical_min = Some(to_signed(payload)),
            GlobalItemKind::PhysicalMax => global.physical_max = Some(to_signed(payload)),
            GlobalItemKind::UnitExponent => {
                global.unit_exponent = Some(normalize_unit_exponent(to_unsigned(payload) as i32))
            }
            GlobalItemKind::Unit => global.unit = Some(to_unsigned(payload)),
            GlobalItemKind::ReportSize => global.report_size = Some(to_unsigned(payload)),
            GlobalItemKind::ReportID => {
                global.report_id = Some(payload.first().copied().unwrap_or(0));
            }
            GlobalItemKind::ReportCount => global.report_count = Some(to_unsigned(payload)),
            GlobalItemKind::Push => {
                if stack.len() >= MAX_STACK_DEPTH {
                    return Err(ParseError::StackOverflow {
                        offset,
                        max: MAX_STACK_DEPTH,
                    });
                }
                stack.push(global.clone());
            }
            GlobalItemKind::Pop => {
                *global = stack.pop().ok_or(ParseError::UnbalancedPushPop { offset })?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_main(
        &self,
        tag: u8,
        global: &GlobalState,
        local: &LocalState,
        bit_cursor: &mut HashMap<u8, u32>,
        bindings: &mut Vec<FieldBinding>,
        collection_depth: &mut i32,
    ) {
        let kind = match MainItemKind::try_from(tag) {
            Ok(k) => k,
            Err(()) => {
                log::warn!("unknown main item tag {tag:#x}, ignoring");
                return;
            }
        };

        match kind {
            MainItemKind::Collection => *collection_depth += 1,
            MainItemKind::EndCollection => {
                if *collection_depth == 0 {
                    log::trace!("EndCollection with no matching Collection");
                } else {
                    *collection_depth -= 1;
                }
            }
            MainItemKind::Input | MainItemKind::Output | MainItemKind::Feature => {
                let report_id = global.report_id.unwrap_or(0);
                let report_size = global.report_size.unwrap_or(0);
                let report_count = global.report_count.unwrap_or(0);
                let cursor_before = *bit_cursor.entry(report_id).or_insert(0);

                if kind == MainItemKind::Input {
                    for i in 0..report_count {
                        let usage = match local.usage_for_index(i as usize) {
                            Some(u) => u,
                            None => continue,
                        };
                        let Some(usage_page) = global.usage_page else {
                            continue;
                        };
                        let key = (usage_page, usage as u16);
                        if !is_watched(key) || bindings.iter().any(|b| b.key == key) {
                            continue; // not watched, or first-wins already claimed it
                        }

                        let logical_min = global.logical_min.unwrap_or(0);
                        let logical_max = global.logical_max.unwrap_or(0);
                        let (physical_min, physical_max) = resolve_physical_range(global, logical_min, logical_max);

                        if logical_max == logical_min {
                            log::warn!(
                                "{}: degenerate logical range [{logical_min}, {logical_max}], every report will skip this field",
                                watched_name(key).unwrap_or("unknown")
                            );
                        }

                        bindings.push(FieldBinding {
                            key,
                            name: watched_name(key).unwrap_or("unknown"),
                            report_id,
                            bit_offset: cursor_before + i * report_size,
                            bit_width: report_size,
                            logical_min,
                            logical_max,
                            physical_min,
                            physical_max,
                            unit_exponent: global.unit_exponent.unwrap_or(0),
                            signed: logical_min < 0,
                        });
                        log::debug!("bound {:?} on report {report_id} at bit {}", key, cursor_before + i * report_size);
                    }
                }

                let entry = bit_cursor.entry(report_id).or_insert(0);
                *entry += report_size * report_count;
            }
        }
    }
}

/// `physicalMin == physicalMax == 0`, or either absent, means identity
/// scaling against the logical range (§4.2 edge cases).
fn resolve_physical_range(global: &GlobalState, logical_min: i32, logical_max: i32) -> (i32, i32) {
    match (global.physical_min, global.physical_max) {
        (Some(0), Some(0)) => (logical_min, logical_max),
        (Some(min), Some(max)) => (min, max),
        _ => (logical_min, logical_max),
    }
}

fn apply_local(local: &mut LocalState, tag: u8, payload: &[u8]) {
    let kind = match LocalItemKind::try_from(tag) {
        Ok(k) => k,
        Err(()) => {
            log::warn!("unknown local item tag {tag:#x}, ignoring");
            return;
        }
    };
    match kind {
        LocalItemKind::Usage => local.usages.push(to_unsigned(payload)),
        LocalItemKind::UsageMin => local.usage_min = Some(to_unsigned(payload)),
        LocalItemKind::UsageMax => local.usage_max = Some(to_unsigned(payload)),
        LocalItemKind::DesignatorIdx => local.designator_index = Some(to_unsigned(payload)),
        LocalItemKind::DesignatorMin => local.designator_min = Some(to_unsigned(payload)),
        LocalItemKind::DesignatorMax => local.designator_max = Some(to_unsigned(payload)),
        LocalItemKind::StringIdx => local.string_index = Some(to_unsigned(payload)),
        LocalItemKind::StringMin => local.string_min = Some(to_unsigned(payload)),
        LocalItemKind::StringMax => local.string_max = Some(to_unsigned(payload)),
        LocalItemKind::Delimiter => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{AC_PRESENT_USAGE, BATTERY_SYSTEM_PAGE, REMAINING_CAPACITY_USAGE};

    fn parse(bytes: &[u8]) -> Result<Vec<FieldBinding>, ParseError> {
        DescriptorParser::default().parse(bytes)
    }

    #[test]
    fn minimal_capacity_descriptor() {
        // UsagePage(0x85), Usage(0x66), LMin(0), LMax(100), Size(8),
        // Count(1), ReportID(1), Input.
        let bytes = [
            0x05, 0x85, 0x09, 0x66, 0x15, 0x00, 0x25, 0x64, 0x75, 0x08, 0x95, 0x01, 0x85, 0x01,
            0x81, 0x02,
        ];
        let bindings = parse(&bytes).unwrap();
        assert_eq!(bindings.len(), 1);
        let b = &bindings[0];
        assert_eq!(b.key, (BATTERY_SYSTEM_PAGE, REMAINING_CAPACITY_USAGE));
        assert_eq!(b.report_id, 1);
        assert_eq!(b.bit_offset, 0);
        assert_eq!(b.bit_width, 8);
        assert_eq!(b.logical_min, 0);
        assert_eq!(b.logical_max, 100);
    }

    #[test]
    fn ac_present_boolean_descriptor() {
        let bytes = [
            0x05, 0x85, 0x09, 0xD0, 0x15, 0x00, 0x25, 0x01, 0x75, 0x01, 0x95, 0x01, 0x85, 0x02,
            0x81, 0x02,
        ];
        let bindings = parse(&bytes).unwrap();
        assert_eq!(bindings.len(), 1);
        let b = &bindings[0];
        assert_eq!(b.key, (BATTERY_SYSTEM_PAGE, AC_PRESENT_USAGE));
        assert!(b.is_boolean());
    }

    #[test]
    fn first_wins_on_duplicate_usage() {
        let bytes = [
            0x05, 0x85, // UsagePage(0x85)
            0x09, 0x66, // Usage(0x66)
            0x15, 0x00, // LMin(0)
            0x25, 0x64, // LMax(100)
            0x75, 0x08, // Size(8)
            0x95, 0x01, // Count(1)
            0x85, 0x01, // ReportID(1)
            0x81, 0x02, // Input
            0x09, 0x66, // Usage(0x66) again
            0x85, 0x04, // ReportID(4)
            0x81, 0x02, // Input
        ];
        let bindings = parse(&bytes).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].report_id, 1);
    }

    #[test]
    fn truncated_descriptor_is_reported() {
        let bytes = [0x05, 0x85, 0x09];
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(err, ParseError::TruncatedDescriptor { .. }));
    }

    #[test]
    fn push_pop_restores_global_state() {
        // Push, set LogicalMax to something else, Pop, then bind a field
        // using the LogicalMax from *before* the Push.
        let bytes = [
            0x05, 0x85, // UsagePage(0x85)
            0x15, 0x00, // LMin(0)
            0x25, 0x64, // LMax(100)
            0xA4, // Push
            0x25, 0x01, // LMax(1) -- should be undone by Pop
            0xB4, // Pop
            0x09, 0x66, // Usage(Remaining Capacity)
            0x75, 0x08, // Size(8)
            0x95, 0x01, // Count(1)
            0x85, 0x01, // ReportID(1)
            0x81, 0x02, // Input
        ];
        let bindings = parse(&bytes).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].logical_max, 100);
    }

    #[test]
    fn pop_without_push_is_unbalanced() {
        let bytes = [0xB4]; // Pop with no prior Push
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(err, ParseError::UnbalancedPushPop { .. }));
    }

    #[test]
    fn descriptor_too_large_is_rejected() {
        let bytes = vec![0u8; DEFAULT_MAX_DESCRIPTOR_LEN + 1];
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(err, ParseError::DescriptorTooLarge { .. }));
    }

    #[test]
    fn local_state_is_empty_after_every_main_item() {
        // After an Input item, a fresh Usage for a later Input must not
        // see usages accumulated from the first.
        let bytes = [
            0x05, 0x85, // UsagePage(0x85)
            0x09, 0x44, // Usage(Charging)
            0x15, 0x00, 0x25, 0x01, 0x75, 0x01, 0x95, 0x01, 0x85, 0x01, 0x81, 0x02, // Input #1
            0x09, 0x45, // Usage(Discharging) -- fresh local state
            0x95, 0x01, 0x81, 0x02, // Input #2
        ];
        let bindings = parse(&bytes).unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].key.1, 0x44);
        assert_eq!(bindings[1].key.1, 0x45);
        // Second field must not have picked up bit 0 (Charging's slot).
        assert_eq!(bindings[1].bit_offset, 1);
    }
}
