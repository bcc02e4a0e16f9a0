//! Wire-format records for the legacy i.MX Image Vector Table (versions
//! 2/3) and its Device Configuration Data command stream.
//!
//! Byte-orders are per-record rather than global (spec.md §5.1): the
//! common header and DCD command bodies are big-endian; the IVT body and
//! BootData are little-endian.

use binrw::binrw;

use crate::imx::types::named_u8_enum;

/// Maximum DCD length NXP's ROM bootloader accepts.
pub const DCD_MAX_LENGTH: u16 = 1768;

/// The 4-byte common header shared by the IVT itself, the DCD, and every
/// DCD command (spec.md §5.1: "legacy IVT common headers are big-endian").
#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub tag: u8,
    pub length: u16,
    pub version: u8,
}

impl Header {
    pub const SIZE: usize = 4;
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvtBody {
    pub entry: u32,
    pub reserved1: u32,
    pub dcd: u32,
    pub boot_data: u32,
    pub self_addr: u32,
    pub csf: u32,
    pub reserved2: u32,
}

impl IvtBody {
    pub const SIZE: usize = 28;
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootData {
    pub start: u32,
    pub length: u32,
    pub plugins: u32,
}

impl BootData {
    pub const SIZE: usize = 12;
}

#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteDataRecord {
    pub address: u32,
    pub value: u32,
}

impl WriteDataRecord {
    pub const SIZE: usize = 8;
}

#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckDataRecord {
    pub address: u32,
    pub mask: u32,
    pub count: u32,
}

impl CheckDataRecord {
    pub const SIZE: usize = 12;
}

#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockRecord {
    pub value: u32,
}

impl UnlockRecord {
    pub const SIZE: usize = 4;
}

named_u8_enum!(
    /// Known values for [`Header::version`] on the IVT itself.
    IvtVersion { V2 = 0x40, V3 = 0x41 }
);

named_u8_enum!(
    /// Known values for [`Header::tag`] across the IVT/DCD hierarchy.
    IvtTag { Ivt = 0xD1, Dcd = 0xD2 }
);

named_u8_enum!(
    /// DCD command tags (`Header::tag` on a DCD command header).
    CommandTag {
        Unlock = 0xB2,
        Nop = 0xC0,
        WriteData = 0xCC,
        CheckData = 0xCF,
    }
);
