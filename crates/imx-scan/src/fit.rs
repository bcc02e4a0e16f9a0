//! Flat Image Tree / Flattened Device Tree blob recognition (C4).
//!
//! Grounded on `imx_find_containers/fit/fit_types.py` and
//! `imx_find_containers/fit/fit_container.py`. The external DTS
//! pretty-printer is an out-of-scope collaborator (spec.md §6); it is
//! modeled here as the [`FdtFormatter`] capability so the core never
//! shells out itself.

use binrw::binrw;
use serde::{Deserialize, Serialize};

use crate::byteview::{read_at, slice};
use crate::error::{Error, Result};
use crate::hex::{ByteRange, HexU32};
use crate::report::{FileExt, Image, ImageKind};

const FORMAT: &str = "FIT";

pub const FDT_MAGIC: u32 = 0xD00D_FEED;

#[binrw]
#[brw(big)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdtHeader {
    pub magic: u32,
    pub totalsize: u32,
    pub off_dt_struct: u32,
    pub off_dt_strings: u32,
    pub off_mem_rsvmap: u32,
    pub version: u32,
    pub last_comp_version: u32,
}

impl FdtHeader {
    pub const SIZE: usize = 28;
}

/// Renders a device-tree-source text form of an FDT blob. Out-of-scope
/// collaborator (spec.md §6 "External FDT formatter"); a failure or
/// absent implementation simply omits the DTS image, it is never an
/// error for the container itself.
pub trait FdtFormatter {
    fn render_dts(&self, bytes: &[u8]) -> Option<String>;
}

/// The default formatter: no DTS rendering is available.
pub struct NullFdtFormatter;

impl FdtFormatter for NullFdtFormatter {
    fn render_dts(&self, _bytes: &[u8]) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitContainer {
    pub offset: usize,
    pub end: usize,
    pub totalsize: HexU32,
    pub version: u32,
    pub images: Vec<Image>,
}

pub fn is_candidate(data: &[u8], offset: usize) -> bool {
    if data.len() < offset + 8 {
        return false;
    }
    let magic = u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]]);
    let totalsize =
        u32::from_be_bytes([data[offset + 4], data[offset + 5], data[offset + 6], data[offset + 7]]);
    magic == FDT_MAGIC && offset + totalsize as usize <= data.len()
}

/// Parses the FDT at `offset`, assuming [`is_candidate`] already
/// returned `true` for it. `formatter` is consulted for the optional
/// DTS rendering; `data` must cover `[offset, offset + totalsize)`.
pub fn parse(data: &[u8], offset: usize, formatter: &dyn FdtFormatter) -> Result<FitContainer> {
    let hdr: FdtHeader = read_at(FORMAT, data, offset)?;
    let end = offset + hdr.totalsize as usize;
    let range = ByteRange::new(offset, end);
    let raw = slice(data, offset, end).ok_or_else(|| Error::StructuralInvariantViolation {
        format: FORMAT,
        offset,
        reason: "totalsize extends past buffer".into(),
    })?;

    let mut images = vec![Image { range: Some(range), data: Some(raw.to_vec()), fileext: FileExt::Dtb, kind: ImageKind::Dtb }];

    if let Some(dts) = formatter.render_dts(raw) {
        images.push(Image {
            range: Some(range),
            data: Some(dts.into_bytes()),
            fileext: FileExt::Dts,
            kind: ImageKind::Dts,
        });
    }

    Ok(FitContainer { offset, end, totalsize: hdr.totalsize.into(), version: hdr.version, images })
}

/// Rebases a FIT parsed against a local buffer (an extracted image's own
/// bytes, offset 0) onto the top-level buffer it was actually found in
/// (spec.md §4.4 "Offset fix-up").
pub fn rebase(mut fit: FitContainer, base: usize) -> FitContainer {
    fit.offset += base;
    fit.end += base;
    for image in &mut fit.images {
        if let Some(range) = &mut image.range {
            *range = ByteRange::new(range.start + base, range.end + base);
        }
    }
    fit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fdt_header(buf: &mut [u8], at: usize, totalsize: u32) {
        buf[at..at + 4].copy_from_slice(&FDT_MAGIC.to_be_bytes());
        buf[at + 4..at + 8].copy_from_slice(&totalsize.to_be_bytes());
        buf[at + 8..at + 12].copy_from_slice(&0x40u32.to_be_bytes()); // off_dt_struct
        buf[at + 12..at + 16].copy_from_slice(&0x20u32.to_be_bytes()); // off_dt_strings
        buf[at + 16..at + 20].copy_from_slice(&0u32.to_be_bytes()); // off_mem_rsvmap
        buf[at + 20..at + 24].copy_from_slice(&17u32.to_be_bytes()); // version
        buf[at + 24..at + 28].copy_from_slice(&16u32.to_be_bytes()); // last_comp_version
    }

    struct RecordingFormatter;

    impl FdtFormatter for RecordingFormatter {
        fn render_dts(&self, bytes: &[u8]) -> Option<String> {
            Some(format!("/* {} bytes */", bytes.len()))
        }
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut buf = vec![0u8; 64];
        fdt_header(&mut buf, 0, 64);
        buf[0] = 0; // corrupt the magic
        assert!(!is_candidate(&buf, 0));
    }

    #[test]
    fn rejects_totalsize_beyond_buffer() {
        let mut buf = vec![0u8; 32];
        fdt_header(&mut buf, 0, 1024);
        assert!(!is_candidate(&buf, 0));
    }

    #[test]
    fn parses_dtb_only_with_null_formatter() {
        let mut buf = vec![0u8; 64];
        fdt_header(&mut buf, 0, 64);
        assert!(is_candidate(&buf, 0));

        let fit = parse(&buf, 0, &NullFdtFormatter).expect("valid FDT parses");
        assert_eq!(fit.offset, 0);
        assert_eq!(fit.end, 64);
        assert_eq!(fit.images.len(), 1);
        assert!(matches!(fit.images[0].kind, ImageKind::Dtb));
    }

    #[test]
    fn parses_dtb_and_dts_when_formatter_succeeds() {
        let mut buf = vec![0u8; 48];
        fdt_header(&mut buf, 0, 48);

        let fit = parse(&buf, 0, &RecordingFormatter).expect("valid FDT parses");
        assert_eq!(fit.images.len(), 2);
        assert!(matches!(fit.images[0].kind, ImageKind::Dtb));
        assert!(matches!(fit.images[1].kind, ImageKind::Dts));
        assert_eq!(fit.images[1].data.as_deref(), Some("/* 48 bytes */".as_bytes()));
    }

    #[test]
    fn rebase_shifts_offsets_and_image_ranges() {
        let mut buf = vec![0u8; 32];
        fdt_header(&mut buf, 0, 32);
        let fit = parse(&buf, 0, &NullFdtFormatter).expect("valid FDT parses");

        let shifted = rebase(fit, 0x1000);
        assert_eq!(shifted.offset, 0x1000);
        assert_eq!(shifted.end, 0x1020);
        assert_eq!(shifted.images[0].range(), Some(ByteRange::new(0x1000, 0x1020)));
    }
}
