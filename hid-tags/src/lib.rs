//! Wire-format vocabulary for HID report descriptors: the item tags and
//! the one-byte item prefix, as described in USB HID 1.11 §6.2.2.

use bitfield::bitfield;

/// GlobalItemKind describes global item tags as described in section 6.2.2.7
/// 'Report Descriptor' of the spec, version 1.11.
#[repr(u8)]
#[allow(unused)]
#[derive(Copy, Debug, Clone, Eq, PartialEq)]
pub enum GlobalItemKind {
    UsagePage = 0,
    LogicalMin = 1,
    LogicalMax = 2,
    PhysicalMin = 3,
    PhysicalMax = 4,
    UnitExponent = 5,
    Unit = 6,
    ReportSize = 7,
    ReportID = 8,
    ReportCount = 9,
    Push = 10,
    Pop = 11,
}

impl From<GlobalItemKind> for u8 {
    fn from(kind: GlobalItemKind) -> u8 {
        kind as u8
    }
}

impl core::convert::TryFrom<u8> for GlobalItemKind {
    type Error = ();
    fn try_from(v: u8) -> Result<Self, ()> {
        use GlobalItemKind::*;
        Ok(match v {
            0 => UsagePage,
            1 => LogicalMin,
            2 => LogicalMax,
            3 => PhysicalMin,
            4 => PhysicalMax,
            5 => UnitExponent,
            6 => Unit,
            7 => ReportSize,
            8 => ReportID,
            9 => ReportCount,
            10 => Push,
            11 => Pop,
            _ => return Err(()),
        })
    }
}

/// LocalItemKind describes local item tags as described in section 6.2.2.8
/// 'Local Items' of the spec, version 1.11.
#[repr(u8)]
#[allow(unused)]
#[derive(Copy, Debug, Clone, Eq, PartialEq)]
pub enum LocalItemKind {
    Usage = 0,
    UsageMin = 1,
    UsageMax = 2,
    DesignatorIdx = 3,
    DesignatorMin = 4,
    DesignatorMax = 5,
    StringIdx = 7,
    StringMin = 8,
    StringMax = 9,
    Delimiter = 10,
}

impl From<LocalItemKind> for u8 {
    fn from(kind: LocalItemKind) -> u8 {
        kind as u8
    }
}

impl core::convert::TryFrom<u8> for LocalItemKind {
    type Error = ();
    fn try_from(v: u8) -> Result<Self, ()> {
        use LocalItemKind::*;
        Ok(match v {
            0 => Usage,
            1 => UsageMin,
            2 => UsageMax,
            3 => DesignatorIdx,
            4 => DesignatorMin,
            5 => DesignatorMax,
            7 => StringIdx,
            8 => StringMin,
            9 => StringMax,
            10 => Delimiter,
            _ => return Err(()),
        })
    }
}

/// MainItemKind describes main item tags as described in section 6.2.2.4
/// 'Report Descriptor' of the spec, version 1.11.
#[repr(u8)]
#[allow(unused)]
#[derive(Copy, Debug, Default, Clone, Eq, PartialEq)]
pub enum MainItemKind {
    #[default]
    Input = 0b1000,
    Output = 0b1001,
    Collection = 0b1010,
    Feature = 0b1011,
    EndCollection = 0b1100,
}

impl From<MainItemKind> for u8 {
    fn from(kind: MainItemKind) -> u8 {
        kind as u8
    }
}

impl core::convert::TryFrom<u8> for MainItemKind {
    type Error = ();
    fn try_from(v: u8) -> Result<Self, ()> {
        use MainItemKind::*;
        Ok(match v {
            0b1000 => Input,
            0b1001 => Output,
            0b1010 => Collection,
            0b1011 => Feature,
            0b1100 => EndCollection,
            _ => return Err(()),
        })
    }
}

/// ItemType describes types of items as described in section 6.2.2.7
/// 'Report Descriptor' of the spec, version 1.11. `Reserved` (0b11) is
/// never emitted by a conforming descriptor, but a parser still has to
/// be able to name it when it turns up.
#[repr(u8)]
#[allow(unused)]
#[derive(Copy, Debug, Default, Clone, Eq, PartialEq)]
pub enum ItemType {
    #[default]
    Main = 0,
    Global = 1,
    Local = 2,
    Reserved = 3,
}

impl From<ItemType> for u8 {
    fn from(kind: ItemType) -> u8 {
        kind as u8
    }
}

impl From<u8> for ItemType {
    fn from(v: u8) -> Self {
        match v & 0x3 {
            0 => ItemType::Main,
            1 => ItemType::Global,
            2 => ItemType::Local,
            _ => ItemType::Reserved,
        }
    }
}

bitfield! {
    /// ItemPrefix describes the 1 byte prefix describing a short item in a
    /// descriptor: `bSize` (bits 1:0, where the raw value 3 means 4 payload
    /// bytes), `bType` (bits 3:2) and `bTag` (bits 7:4).
    #[derive(Clone, Copy)]
    pub struct ItemPrefix(u8);
    impl Debug;
    pub byte_count, set_byte_count: 1, 0;
    pub typ, set_type: 3, 2;
    pub tag, set_tag: 7, 4;
}

impl ItemPrefix {
    /// Number of payload bytes following this prefix byte. The raw 2-bit
    /// size of 3 decodes to 4, per HID 1.11 §6.2.2.2.
    pub fn payload_len(&self) -> usize {
        match self.byte_count() {
            3 => 4,
            n => n as usize,
        }
    }

    pub fn item_type(&self) -> ItemType {
        ItemType::from(self.typ())
    }
}

/// The one-byte prefix reserved for long items (HID 1.11 §6.2.2.3).
pub const LONG_ITEM_PREFIX: u8 = 0xFE;
