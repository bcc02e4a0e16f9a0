//! Legacy i.MX Image Vector Table parser, versions 2/3 (C3).
//!
//! Grounded on `imx_find_containers/imx/imx_ivt.py` and
//! `imx_find_containers/imx/ivt_types.py` in the original Python
//! implementation, with endianness and offset arithmetic per spec.md
//! §4.3 and §6's wire-format table taken as authoritative over the
//! original (see DESIGN.md).

mod types;

use serde::{Deserialize, Serialize};

use crate::byteview::{has_remaining, read_at, slice};
use crate::enumish::{Tagged, tag_from_raw};
use crate::error::{Error, Result};
use crate::hex::{ByteRange, HexU32};
use crate::report::{FileExt, Image, ImageKind};

use types::*;

const FORMAT: &str = "IVT";

fn violation(offset: usize, reason: impl Into<String>) -> Error {
    Error::StructuralInvariantViolation { format: FORMAT, offset, reason: reason.into() }
}

fn require(offset: usize, cond: bool, reason: impl Into<String>) -> Result<()> {
    if cond { Ok(()) } else { Err(violation(offset, reason)) }
}

/// `field − addr`, applied to `offset`, as a buffer-relative position.
/// Load-time addresses are absolute; a malformed IVT can point anywhere,
/// so this returns `None` rather than panicking on underflow.
fn rebase(offset: usize, addr: u32, field: u32) -> Option<usize> {
    let delta = field as i64 - addr as i64;
    let abs = offset as i64 + delta;
    usize::try_from(abs).ok()
}

pub fn is_candidate(data: &[u8], offset: usize) -> bool {
    if data.len().saturating_sub(offset) <= Header::SIZE + IvtBody::SIZE {
        return false;
    }
    if data[offset] != u8::from(IvtTag::Ivt) || !matches!(data[offset + 3], 0x40 | 0x41) {
        return false;
    }
    let Ok(hdr) = read_at::<Header>(FORMAT, data, offset) else { return false };
    let Ok(body) = read_at::<IvtBody>(FORMAT, data, offset + Header::SIZE) else { return false };
    hdr.length == 32 && body.reserved1 == 0 && body.reserved2 == 0 && offset + hdr.length as usize <= data.len()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum DcdCommand {
    WriteData { records: Vec<(HexU32, HexU32)> },
    CheckData { records: Vec<(HexU32, HexU32, u32)> },
    Nop,
    Unlock { records: Vec<HexU32> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dcd {
    pub offset: HexU32,
    pub length: u16,
    pub version: u8,
    pub commands: Vec<DcdCommand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ivt {
    pub offset: usize,
    pub end: usize,
    pub version: Tagged<IvtVersion, u8>,
    pub addr: HexU32,
    pub entry: HexU32,
    pub dcd: Option<Dcd>,
    pub images: Vec<Image>,
    /// The CSF block, recorded separately from `images` because its range
    /// `[csf_offset, end)` routinely overlaps the application payload's
    /// range (spec.md §4.3: the CSF trails inside the same `[offset, end)`
    /// span). `Container::find_next_addr` only walks `images`, matching
    /// the original's `ContainerABC.map_images_by_addr`, which never
    /// iterates `self.csf`.
    pub csf: Option<Image>,
}

/// Parses the IVT at `offset`, assuming [`is_candidate`] already
/// returned `true` for it.
pub fn parse(data: &[u8], offset: usize) -> Result<Ivt> {
    let hdr: Header = read_at(FORMAT, data, offset)?;
    require(offset, hdr.tag == u8::from(IvtTag::Ivt), format!("unexpected IVT tag {:#x}", hdr.tag))?;
    let version: Tagged<IvtVersion, u8> = tag_from_raw(hdr.version);
    require(offset, version.known().is_some(), format!("unexpected IVT version {:#x}", hdr.version))?;
    require(offset, hdr.length == 32, format!("IVT length must be 32, got {}", hdr.length))?;

    let body: IvtBody = read_at(FORMAT, data, offset + Header::SIZE)?;
    require(offset, body.reserved1 == 0, "IVT reserved1 must be zero")?;
    require(offset, body.reserved2 == 0, "IVT reserved2 must be zero")?;
    require(offset, offset + hdr.length as usize <= data.len(), "IVT extends past buffer")?;

    let addr = body.self_addr;

    let boot_data_off = rebase(offset, addr, body.boot_data)
        .ok_or_else(|| violation(offset, "boot_data address underflows IVT base"))?;
    let boot_data: BootData = read_at(FORMAT, data, boot_data_off)?;

    let app_start = rebase(offset, addr, boot_data.start)
        .ok_or_else(|| violation(offset, "application start address underflows IVT base"))?;
    require(
        offset,
        app_start <= data.len(),
        format!("application start {app_start:#x} exceeds buffer length {:#x}", data.len()),
    )?;
    let mut app_end = app_start + boot_data.length as usize;

    if app_end > data.len() {
        log::warn!(
            "(@ {offset:#x}) application payload clamped: declared end {app_end:#x} > buffer length {:#x}",
            data.len()
        );
        app_end = data.len();
    }
    let app_data = slice(data, app_start, app_end).map(|s| s.to_vec());

    let app_entry_off = rebase(offset, addr, body.entry)
        .ok_or_else(|| violation(offset, "entry address underflows IVT base"))?;

    let images = vec![Image {
        range: Some(ByteRange::new(app_start, app_end)),
        data: app_data,
        fileext: FileExt::Bin,
        kind: ImageKind::IvtApp { entry: (app_entry_off as u32).into() },
    }];

    let dcd = if body.dcd != 0 {
        let dcd_off =
            rebase(offset, addr, body.dcd).ok_or_else(|| violation(offset, "dcd address underflows IVT base"))?;
        Some(parse_dcd(data, dcd_off)?)
    } else {
        None
    };

    let mut csf = None;
    if body.csf != 0 {
        let csf_off =
            rebase(offset, addr, body.csf).ok_or_else(|| violation(offset, "csf address underflows IVT base"))?;
        // The CSF trails the application payload and shares its end
        // (spec.md §4.3: "container.end is set to app_end"). Kept out of
        // `images` since it routinely overlaps the application payload's
        // range, which would violate the "images within a container don't
        // overlap" invariant `find_next_addr` relies on.
        if csf_off > app_end {
            log::warn!("(@ {offset:#x}) CSF offset {csf_off:#x} beyond application end {app_end:#x}, dropping");
        } else {
            csf = Some(Image {
                range: Some(ByteRange::new(csf_off, app_end)),
                data: slice(data, csf_off, app_end).map(|s| s.to_vec()),
                fileext: FileExt::Bin,
                kind: ImageKind::OpaqueCsf,
            });
        }
    }

    Ok(Ivt {
        offset,
        end: app_end,
        version,
        addr: addr.into(),
        entry: (app_entry_off as u32).into(),
        dcd,
        images,
        csf,
    })
}

fn parse_dcd(data: &[u8], offset: usize) -> Result<Dcd> {
    let hdr: Header = read_at(FORMAT, data, offset)?;
    require(offset, hdr.tag == u8::from(IvtTag::Dcd), format!("unexpected DCD tag {:#x}", hdr.tag))?;
    require(offset, hdr.length <= DCD_MAX_LENGTH, "DCD length exceeds 1768-byte cap")?;
    require(offset, has_remaining(data, offset, hdr.length as usize), "DCD extends past buffer")?;

    let end = offset + hdr.length as usize;
    let mut cursor = offset + Header::SIZE;
    let mut commands = Vec::new();

    while cursor < end {
        let cmd_hdr: Header = read_at(FORMAT, data, cursor)?;
        let tag = CommandTag::try_from(cmd_hdr.tag)
            .map_err(|raw| violation(cursor, format!("unknown DCD command tag {raw:#x}")))?;
        let body_len = cmd_hdr.length as usize;
        require(cursor, body_len >= Header::SIZE, "DCD command length smaller than its own header")?;
        let records_bytes = body_len - Header::SIZE;
        let body_start = cursor + Header::SIZE;

        let command = match tag {
            CommandTag::Nop => DcdCommand::Nop,
            CommandTag::WriteData => {
                DcdCommand::WriteData { records: read_records(data, body_start, records_bytes, cursor)? }
            }
            CommandTag::CheckData => {
                DcdCommand::CheckData { records: read_check_records(data, body_start, records_bytes, cursor)? }
            }
            CommandTag::Unlock => {
                DcdCommand::Unlock { records: read_unlock_records(data, body_start, records_bytes, cursor)? }
            }
        };
        commands.push(command);
        cursor += body_len;
    }

    Ok(Dcd { offset: (offset as u32).into(), length: hdr.length, version: hdr.version, commands })
}

fn read_records(
    data: &[u8],
    start: usize,
    bytes: usize,
    cmd_offset: usize,
) -> Result<Vec<(HexU32, HexU32)>> {
    require(cmd_offset, bytes % WriteDataRecord::SIZE == 0, "WRITE_DATA record misalignment")?;
    let mut records = Vec::with_capacity(bytes / WriteDataRecord::SIZE);
    let mut p = start;
    for _ in 0..bytes / WriteDataRecord::SIZE {
        let r: WriteDataRecord = read_at(FORMAT, data, p)?;
        records.push((r.address.into(), r.value.into()));
        p += WriteDataRecord::SIZE;
    }
    Ok(records)
}

fn read_check_records(
    data: &[u8],
    start: usize,
    bytes: usize,
    cmd_offset: usize,
) -> Result<Vec<(HexU32, HexU32, u32)>> {
    require(cmd_offset, bytes % CheckDataRecord::SIZE == 0, "CHECK_DATA record misalignment")?;
    let mut records = Vec::with_capacity(bytes / CheckDataRecord::SIZE);
    let mut p = start;
    for _ in 0..bytes / CheckDataRecord::SIZE {
        let r: CheckDataRecord = read_at(FORMAT, data, p)?;
        records.push((r.address.into(), r.mask.into(), r.count));
        p += CheckDataRecord::SIZE;
    }
    Ok(records)
}

fn read_unlock_records(data: &[u8], start: usize, bytes: usize, cmd_offset: usize) -> Result<Vec<HexU32>> {
    require(cmd_offset, bytes % UnlockRecord::SIZE == 0, "UNLOCK record misalignment")?;
    let mut records = Vec::with_capacity(bytes / UnlockRecord::SIZE);
    let mut p = start;
    for _ in 0..bytes / UnlockRecord::SIZE {
        let r: UnlockRecord = read_at(FORMAT, data, p)?;
        records.push(r.value.into());
        p += UnlockRecord::SIZE;
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_be_header(buf: &mut [u8], at: usize, tag: u8, length: u16, version: u8) {
        buf[at] = tag;
        buf[at + 1..at + 3].copy_from_slice(&length.to_be_bytes());
        buf[at + 3] = version;
    }

    fn put_u32_le(buf: &mut [u8], at: usize, value: u32) {
        buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u32_be(buf: &mut [u8], at: usize, value: u32) {
        buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Addresses follow spec.md §8 scenario 5; the DCD is shrunk to a
    /// single fully-specified WRITE_DATA command instead of padding out
    /// to a 64-byte span with unparsed trailing bytes.
    #[test]
    fn parses_ivt_with_dcd_csf_and_application_payload() {
        let mut buf = vec![0u8; 0x2000];
        let off = 0x400usize;
        let addr = 0x1000_0400u32;

        put_be_header(&mut buf, off, 0xD1, 32, 0x41);
        put_u32_le(&mut buf, off + 4, 0x1000_0800); // entry
        put_u32_le(&mut buf, off + 8, 0); // reserved1
        put_u32_le(&mut buf, off + 12, 0x1000_0440); // dcd
        put_u32_le(&mut buf, off + 16, 0x1000_0420); // boot_data
        put_u32_le(&mut buf, off + 20, addr); // self address
        put_u32_le(&mut buf, off + 24, 0x1000_1000); // csf
        put_u32_le(&mut buf, off + 28, 0); // reserved2

        put_u32_le(&mut buf, 0x420, 0x1000_0000); // boot_data.start
        put_u32_le(&mut buf, 0x424, 0x2000); // boot_data.length
        put_u32_le(&mut buf, 0x428, 0); // boot_data.plugins

        put_be_header(&mut buf, 0x440, 0xD2, 16, 0x43); // DCD header
        put_be_header(&mut buf, 0x444, 0xCC, 12, 0x00); // WRITE_DATA command header
        put_u32_be(&mut buf, 0x448, 0x3000_0000); // record address
        put_u32_be(&mut buf, 0x44C, 0x1234_5678); // record value

        assert!(is_candidate(&buf, off));
        let ivt = parse(&buf, off).expect("valid IVT parses");

        assert_eq!(ivt.end, 0x2000);
        assert!(ivt.images.iter().any(|img| matches!(img.kind, ImageKind::IvtApp { .. })
            && img.range() == Some(ByteRange::new(0, 0x2000))));
        let csf = ivt.csf.expect("csf present");
        assert!(matches!(csf.kind, ImageKind::OpaqueCsf));
        assert_eq!(csf.range(), Some(ByteRange::new(0x1000, 0x2000)));

        let dcd = ivt.dcd.expect("dcd present");
        assert_eq!(dcd.commands.len(), 1);
        match &dcd.commands[0] {
            DcdCommand::WriteData { records } => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].0.0, 0x3000_0000);
                assert_eq!(records[0].1.0, 0x1234_5678);
            }
            other => panic!("expected WRITE_DATA, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_version_byte() {
        let mut buf = vec![0u8; 64];
        put_be_header(&mut buf, 0, 0xD1, 32, 0x99);
        assert!(!is_candidate(&buf, 0));
    }
}
