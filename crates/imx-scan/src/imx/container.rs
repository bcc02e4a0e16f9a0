//! Full parse of the i.MX Authentication Container, version 0 (C2).
//!
//! Grounded on `imx_find_containers/imx/__init__.py` and
//! `imx_find_containers/imx/imx_types.py` in the original Python
//! implementation; structured per spec.md §4.2.

use serde::{Deserialize, Serialize};

use crate::byteview::{has_remaining, read_at, slice};
use crate::enumish::{Tagged, tag_from_raw};
use crate::error::{Error, Result};
use crate::hex::{ByteRange, HexBytes, HexU32, HexU64};
use crate::report::{FileExt, Image, ImageKind};

use super::types::*;

const FORMAT: &str = "i.MX Container";

/// Cheap pre-filter run by the sweep before attempting a full parse
/// (spec.md §4.2 `is_container`).
pub fn is_candidate(data: &[u8], offset: usize) -> bool {
    if data.len().saturating_sub(offset) <= ContainerHeader::SIZE {
        return false;
    }
    if data[offset] != 0x00 || !matches!(data[offset + 3], 0x87 | 0x89) {
        return false;
    }
    let Ok(hdr) = read_at::<ContainerHeader>(FORMAT, data, offset) else {
        return false;
    };
    hdr.length as usize <= MAX_CONTAINER_SIZE as usize
        && offset + hdr.length as usize <= data.len()
        && hdr.num_images <= MAX_IMAGES_PER_CONTAINER
        && offset + hdr.sig_offset as usize <= data.len()
        && (hdr.num_images != 0 || hdr.sig_offset != 0)
}

fn violation(offset: usize, reason: impl Into<String>) -> Error {
    Error::StructuralInvariantViolation {
        format: FORMAT,
        offset,
        reason: reason.into(),
    }
}

fn require(offset: usize, cond: bool, reason: impl Into<String>) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(violation(offset, reason))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContainerHeaderInfo {
    pub version: u8,
    pub length: u16,
    pub tag: Tagged<HeaderTag, u8>,
    pub flags: HexU32,
    pub sw_ver: u16,
    pub fuse_ver: u8,
    pub num_images: u8,
    pub sig_offset: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SrkFlags {
    pub set: Tagged<SrkSet, u8>,
    pub index: u8,
    pub revoke_mask: u8,
}

impl SrkFlags {
    fn from_flags(flags: u32) -> Self {
        SrkFlags {
            set: tag_from_raw((flags & 0x3) as u8),
            index: ((flags >> 4) & 0x3) as u8,
            revoke_mask: ((flags >> 8) & 0xF) as u8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImxImageInfo {
    pub header_offset: HexU32,
    pub size: u32,
    pub dest: HexU64,
    pub entry: HexU64,
    pub hash: HexBytes,
    pub iv: HexBytes,
    pub image_type: Tagged<ImageType, u8>,
    pub core_id: Tagged<CoreType, u8>,
    pub hash_type: Tagged<HashType, u8>,
    pub encrypted: bool,
    pub boot_flags: u16,
    pub cpu_id: Tagged<CpuId, u16>,
    pub mu_id: Tagged<MuId, u16>,
    pub partition_id: Tagged<PartitionId, u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrkRecord {
    pub offset: HexU32,
    pub alg: AlgType,
    pub hash: HashType,
    /// RSA: `(modulus, exponent)`. ECDSA: `(x, y)`. Same wire fields,
    /// different meaning depending on `alg` (spec.md §3 SRKRecord).
    pub key_size_or_curve: KeySizeOrCurve,
    pub part_a: HexBytes,
    pub part_b: HexBytes,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum KeySizeOrCurve {
    Rsa(RsaKeySize),
    Ecdsa(EcdsaCurve),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrkTable {
    pub offset: HexU32,
    pub records: Vec<SrkRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub offset: HexU32,
    pub data: HexBytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub offset: HexU32,
    pub permissions: u8,
    pub public_key: SrkRecord,
    pub signature: HexBytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dek {
    pub offset: HexU32,
    pub is_kek: bool,
    pub key_size: Tagged<AesKeySize, u8>,
    pub key: HexBytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureBlock {
    pub offset: HexU32,
    pub srk_table: SrkTable,
    pub signature: Signature,
    pub certificate: Option<Certificate>,
    pub dek: Option<Dek>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImxContainer {
    pub offset: usize,
    pub end: usize,
    pub header: ContainerHeaderInfo,
    pub srk: SrkFlags,
    pub images: Vec<Image>,
    pub sigblock: Option<SignatureBlock>,
}

/// Parses the container at `offset`, assuming [`is_candidate`] already
/// returned `true` for it.
pub fn parse(data: &[u8], offset: usize) -> Result<ImxContainer> {
    require(offset, data.len() > ContainerHeader::SIZE, "buffer too small")?;
    let hdr: ContainerHeader = read_at(FORMAT, data, offset)?;

    require(offset, hdr.version == 0, format!("unexpected version {:#x}", hdr.version))?;
    let tag: Tagged<HeaderTag, u8> = tag_from_raw(hdr.tag);
    require(
        offset,
        matches!(tag, Tagged::Known(HeaderTag::Container) | Tagged::Known(HeaderTag::Message)),
        format!("unexpected tag {:#x}", hdr.tag),
    )?;
    if matches!(tag, Tagged::Known(HeaderTag::Message)) {
        require(offset, hdr.num_images == 0, "MESSAGE container must have num_images == 0")?;
    }

    let srk = SrkFlags::from_flags(hdr.flags);
    let end = offset + hdr.length as usize;

    let mut images = Vec::with_capacity(hdr.num_images as usize);
    let start = offset + ContainerHeader::SIZE;
    for i in 0..hdr.num_images as usize {
        let img_hdr_offset = start + i * ImageHeader::SIZE;
        images.push(parse_image(data, offset, img_hdr_offset)?);
    }

    let sigblock = if hdr.sig_offset != 0 {
        Some(parse_sig_block(data, offset + hdr.sig_offset as usize)?)
    } else {
        None
    };

    let header = ContainerHeaderInfo {
        version: hdr.version,
        length: hdr.length,
        tag,
        flags: hdr.flags.into(),
        sw_ver: hdr.sw_ver,
        fuse_ver: hdr.fuse_ver,
        num_images: hdr.num_images,
        sig_offset: hdr.sig_offset,
    };

    Ok(ImxContainer { offset, end, header, srk, images, sigblock })
}

fn parse_image(data: &[u8], container_offset: usize, hdr_offset: usize) -> Result<Image> {
    let hdr: ImageHeader = read_at(FORMAT, data, hdr_offset)?;

    let image_type: Tagged<ImageType, u8> = tag_from_raw((hdr.flags & 0xF) as u8);
    let core_id: Tagged<CoreType, u8> = tag_from_raw(((hdr.flags >> 4) & 0xF) as u8);
    let hash_type: Tagged<HashType, u8> = tag_from_raw(((hdr.flags >> 8) & 0x7) as u8);
    let encrypted = hdr.flags & 0x800 != 0;
    let boot_flags = ((hdr.flags >> 16) & 0xFFFF) as u16;
    let cpu_id: Tagged<CpuId, u16> = tag_from_raw((hdr.metadata & 0x3FF) as u16);
    let mu_id: Tagged<MuId, u16> = tag_from_raw(((hdr.metadata >> 10) & 0x3FF) as u16);
    let partition_id: Tagged<PartitionId, u8> = tag_from_raw(((hdr.metadata >> 20) & 0xFF) as u8);

    let is_dcd_ddr = matches!(image_type, Tagged::Known(ImageType::DcdDdr));

    let (range, blob) = if hdr.offset == 0 {
        log::warn!("(@ {hdr_offset:#x}) empty image: offset = {}, size = {}", hdr.offset, hdr.size);
        (None, None)
    } else {
        let offset_abs = container_offset + hdr.offset as usize;
        if hdr.size == 0 {
            if !is_dcd_ddr {
                log::warn!("(@ {hdr_offset:#x}) empty image: offset = {}, size = {}", hdr.offset, hdr.size);
            }
            (None, None)
        } else {
            let image_end = offset_abs + hdr.size as usize;
            if !has_remaining(data, offset_abs, hdr.size as usize) {
                log::warn!(
                    "(@ {hdr_offset:#x}) image length invalid: {:#x} !>= {:#x}",
                    data.len(),
                    image_end
                );
                (None, None)
            } else {
                let bytes = slice(data, offset_abs, image_end).expect("checked above").to_vec();
                (Some(ByteRange::new(offset_abs, image_end)), Some(bytes))
            }
        }
    };

    let info = ImxImageInfo {
        header_offset: hdr.offset.into(),
        size: hdr.size,
        dest: hdr.dest.into(),
        entry: hdr.entry.into(),
        hash: HexBytes(hdr.hash.to_vec()),
        iv: HexBytes(hdr.iv.to_vec()),
        image_type,
        core_id,
        hash_type,
        encrypted,
        boot_flags,
        cpu_id,
        mu_id,
        partition_id,
    };

    Ok(Image {
        range,
        data: blob,
        fileext: FileExt::Bin,
        kind: ImageKind::IMxImage(Box::new(info)),
    })
}

/// Parses the SRK record at `offset`, returning it alongside its own wire
/// length so callers walking a table of records don't need to re-decode
/// the header a second time just to learn how far to advance.
fn parse_srk_record(data: &[u8], offset: usize) -> Result<(SrkRecord, usize)> {
    let hdr: SrkRecordHeader = read_at(FORMAT, data, offset)?;
    require(
        offset,
        hdr.tag == u8::from(HeaderTag::Srk),
        format!("unexpected SRK tag {:#x}", hdr.tag),
    )?;

    let alg = AlgType::try_from(hdr.alg)
        .map_err(|raw| violation(offset, format!("unknown SRK alg {raw:#x}")))?;
    let hash = HashType::try_from(hdr.hash)
        .map_err(|raw| violation(offset, format!("unknown SRK hash {raw:#x}")))?;

    let body_start = offset + SrkRecordHeader::SIZE;
    let mid = body_start + hdr.mod_len as usize;
    let body_end = mid + hdr.exp_len as usize;

    require(
        offset,
        hdr.length as usize == SrkRecordHeader::SIZE + hdr.mod_len as usize + hdr.exp_len as usize,
        "SRK record length does not match header + mod_len + exp_len",
    )?;

    let part_a = slice(data, body_start, mid)
        .ok_or_else(|| violation(offset, "SRK record body truncated"))?
        .to_vec();
    let part_b = slice(data, mid, body_end)
        .ok_or_else(|| violation(offset, "SRK record body truncated"))?
        .to_vec();

    let key_size_or_curve = match alg {
        AlgType::Rsa => KeySizeOrCurve::Rsa(
            RsaKeySize::try_from(hdr.key_size)
                .map_err(|raw| violation(offset, format!("unknown RSA key size {raw:#x}")))?,
        ),
        AlgType::Ecdsa => KeySizeOrCurve::Ecdsa(
            EcdsaCurve::try_from(hdr.key_size)
                .map_err(|raw| violation(offset, format!("unknown ECDSA curve {raw:#x}")))?,
        ),
    };

    let record = SrkRecord {
        offset: (offset as u32).into(),
        alg,
        hash,
        key_size_or_curve,
        part_a: HexBytes(part_a),
        part_b: HexBytes(part_b),
    };
    Ok((record, hdr.length as usize))
}

fn parse_srk_table(data: &[u8], offset: usize) -> Result<SrkTable> {
    let hdr: SrkTableHeader = read_at(FORMAT, data, offset)?;
    require(
        offset,
        hdr.version == 0x42 && hdr.tag == u8::from(HeaderTag::SrkTable),
        "bad SRK table header",
    )?;

    let mut records = Vec::with_capacity(4);
    let mut cursor = offset + SrkTableHeader::SIZE;
    for _ in 0..4 {
        let (record, wire_length) = parse_srk_record(data, cursor)?;
        cursor += wire_length;
        records.push(record);
    }

    require(offset, cursor == offset + hdr.length as usize, "SRK table length mismatch")?;

    Ok(SrkTable { offset: (offset as u32).into(), records })
}

fn parse_signature(data: &[u8], offset: usize) -> Result<Signature> {
    let hdr: SignatureHeader = read_at(FORMAT, data, offset)?;
    require(
        offset,
        hdr.version == 0 && hdr.tag == u8::from(HeaderTag::Signature),
        "bad signature header",
    )?;
    let body = slice(data, offset + SignatureHeader::SIZE, offset + hdr.length as usize)
        .ok_or_else(|| violation(offset, "signature body truncated"))?;
    Ok(Signature { offset: (offset as u32).into(), data: HexBytes(body.to_vec()) })
}

fn parse_certificate(data: &[u8], offset: usize) -> Result<Certificate> {
    let hdr: CertificateHeader = read_at(FORMAT, data, offset)?;
    require(
        offset,
        hdr.version == 0 && hdr.tag == u8::from(HeaderTag::Certificate),
        "bad certificate header",
    )?;
    require(offset, (!hdr.perms) & 0xFF == hdr.perms_inv, "perms_inv mismatch")?;

    let (public_key, _) = parse_srk_record(data, offset + CertificateHeader::SIZE)?;
    let signature = slice(data, offset + hdr.sig_offset as usize, offset + hdr.length as usize)
        .ok_or_else(|| violation(offset, "certificate signature truncated"))?;

    Ok(Certificate {
        offset: (offset as u32).into(),
        permissions: hdr.perms,
        public_key,
        signature: HexBytes(signature.to_vec()),
    })
}

fn parse_dek(data: &[u8], offset: usize) -> Result<Dek> {
    let hdr: DekHeader = read_at(FORMAT, data, offset)?;
    require(offset, hdr.version == 0 && hdr.tag == u8::from(HeaderTag::Dek), "bad DEK header")?;
    require(offset, hdr.alg == u8::from(EncryptionAlg::Aes), "unexpected DEK alg")?;
    require(offset, hdr.mode == u8::from(EncryptionMode::Cbc), "unexpected DEK mode")?;

    let key = slice(data, offset + DekHeader::SIZE, offset + hdr.length as usize)
        .ok_or_else(|| violation(offset, "DEK key truncated"))?;

    Ok(Dek {
        offset: (offset as u32).into(),
        is_kek: hdr.flags & 0x80 != 0,
        key_size: tag_from_raw(hdr.size),
        key: HexBytes(key.to_vec()),
    })
}

fn parse_sig_block(data: &[u8], offset: usize) -> Result<SignatureBlock> {
    let hdr: SignatureBlockHeader = read_at(FORMAT, data, offset)?;
    require(
        offset,
        hdr.version == 0 && hdr.tag == u8::from(HeaderTag::SignatureBlock),
        "bad signature block header",
    )?;

    let srk_table = parse_srk_table(data, offset + hdr.srk_table_offset as usize)?;
    let signature = parse_signature(data, offset + hdr.sig_offset as usize)?;
    let certificate = if hdr.cert_offset != 0 {
        Some(parse_certificate(data, offset + hdr.cert_offset as usize)?)
    } else {
        None
    };
    let dek = if hdr.dek_offset != 0 { Some(parse_dek(data, offset + hdr.dek_offset as usize)?) } else { None };

    Ok(SignatureBlock { offset: (offset as u32).into(), srk_table, signature, certificate, dek })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container_header(length: u16, tag: u8, num_images: u8, sig_offset: u32) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ContainerHeader::SIZE);
        buf.push(0x00); // version
        buf.extend_from_slice(&length.to_le_bytes());
        buf.push(tag);
        buf.extend_from_slice(&0u32.to_le_bytes()); // flags
        buf.extend_from_slice(&0u16.to_le_bytes()); // sw_ver
        buf.push(0x00); // fuse_ver
        buf.push(num_images);
        buf.extend_from_slice(&sig_offset.to_le_bytes());
        buf
    }

    fn image_header(offset: u32, size: u32, image_type: u8) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ImageHeader::SIZE);
        buf.extend_from_slice(&offset.to_le_bytes());
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes()); // dest
        buf.extend_from_slice(&0u64.to_le_bytes()); // entry
        buf.extend_from_slice(&(image_type as u32).to_le_bytes()); // flags: type in low nibble
        buf.extend_from_slice(&0u32.to_le_bytes()); // metadata
        buf.extend_from_slice(&[0u8; 64]); // hash
        buf.extend_from_slice(&[0u8; 32]); // iv
        buf
    }

    fn srk_record(alg: u8, hash: u8, key_size: u8, modulus: &[u8], exponent: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SrkRecordHeader::SIZE + modulus.len() + exponent.len());
        buf.push(0xE1); // tag
        let length = (SrkRecordHeader::SIZE + modulus.len() + exponent.len()) as u16;
        buf.extend_from_slice(&length.to_le_bytes());
        buf.push(alg);
        buf.push(hash);
        buf.push(key_size);
        buf.push(0x00); // flags
        buf.push(0x00); // reserved pad byte
        buf.extend_from_slice(&(modulus.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(exponent.len() as u16).to_le_bytes());
        buf.extend_from_slice(modulus);
        buf.extend_from_slice(exponent);
        buf
    }

    fn srk_table(records: &[Vec<u8>]) -> Vec<u8> {
        let total_len: usize = records.iter().map(|r| r.len()).sum();
        let mut buf = Vec::with_capacity(SrkTableHeader::SIZE + total_len);
        buf.push(0xD7); // tag
        buf.extend_from_slice(&((SrkTableHeader::SIZE + total_len) as u16).to_le_bytes());
        buf.push(0x42); // version
        for r in records {
            buf.extend_from_slice(r);
        }
        buf
    }

    fn signature(body: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SignatureHeader::SIZE + body.len());
        buf.push(0x00); // version
        buf.extend_from_slice(&((SignatureHeader::SIZE + body.len()) as u16).to_le_bytes());
        buf.push(0xD8); // tag
        buf.extend_from_slice(&[0u8; 4]); // pad
        buf.extend_from_slice(body);
        buf
    }

    fn trivial_srk_record() -> Vec<u8> {
        srk_record(0x21, 0x00, 0x05, &[0xAA; 4], &[0xBB; 2])
    }

    #[test]
    fn rejects_buffer_too_small() {
        let buf = container_header(16, 0x87, 0, 0);
        assert!(!is_candidate(&buf, 0));
    }

    #[test]
    fn rejects_zero_images_and_zero_sig_offset() {
        let mut buf = container_header(16, 0x87, 0, 0);
        buf.extend_from_slice(&[0u8; 16]); // pad past the tiny pre-check threshold
        assert!(!is_candidate(&buf, 0));
    }

    #[test]
    fn rejects_truncated_length() {
        let mut buf = container_header(0x2000, 0x87, 0, 1);
        buf.resize(0x1000, 0);
        assert!(!is_candidate(&buf, 0));
    }

    #[test]
    fn accepts_and_parses_single_image_container() {
        let payload_offset = (ContainerHeader::SIZE + ImageHeader::SIZE) as u32;
        let mut buf = container_header(16, 0x87, 1, 0);
        let img = image_header(payload_offset, 4, 0x03); // EXE image right after the table
        buf.extend_from_slice(&img);
        buf.extend_from_slice(&[0xCC; 4]); // the image's own 4 bytes of payload

        assert!(is_candidate(&buf, 0));
        let container = parse(&buf, 0).expect("valid single-image container parses");
        assert_eq!(container.images.len(), 1);
        let image = &container.images[0];
        assert_eq!(image.data.as_deref(), Some(&[0xCC; 4][..]));
        assert_eq!(image.range().unwrap().start, payload_offset as usize);
        assert_eq!(image.range().unwrap().end, payload_offset as usize + 4);
    }

    #[test]
    fn message_container_with_signature_block_and_no_images() {
        let srk = srk_table(&[trivial_srk_record(), trivial_srk_record(), trivial_srk_record(), trivial_srk_record()]);
        let sig = signature(&[0xDD; 8]);

        let sigblock_srk_off = SignatureBlockHeader::SIZE as u16;
        let sigblock_sig_off = sigblock_srk_off + srk.len() as u16;
        let mut sigblock = Vec::new();
        sigblock.push(0x00); // version
        let sigblock_len = SignatureBlockHeader::SIZE as u16 + srk.len() as u16 + sig.len() as u16;
        sigblock.extend_from_slice(&sigblock_len.to_le_bytes());
        sigblock.push(0x90); // tag
        sigblock.extend_from_slice(&0u16.to_le_bytes()); // cert_offset
        sigblock.extend_from_slice(&sigblock_srk_off.to_le_bytes());
        sigblock.extend_from_slice(&sigblock_sig_off.to_le_bytes());
        sigblock.extend_from_slice(&0u16.to_le_bytes()); // dek_offset
        sigblock.extend_from_slice(&srk);
        sigblock.extend_from_slice(&sig);

        let header_sig_offset = ContainerHeader::SIZE as u32;
        let mut buf = container_header(16, 0x89, 0, header_sig_offset);
        buf.extend_from_slice(&sigblock);

        assert!(is_candidate(&buf, 0));
        let container = parse(&buf, 0).expect("MESSAGE container with sigblock parses");
        assert!(container.images.is_empty());
        let sb = container.sigblock.expect("signature block present");
        assert_eq!(sb.srk_table.records.len(), 4);
        assert!(sb.certificate.is_none());
        assert!(sb.dek.is_none());
    }

    #[test]
    fn dcd_ddr_image_with_zero_size_is_silent() {
        let mut buf = container_header(16, 0x87, 1, 0);
        let img = image_header(16, 0, 0x05); // DCD_DDR, size 0
        buf.extend_from_slice(&img);

        let container = parse(&buf, 0).expect("parses despite empty DCD_DDR image");
        assert_eq!(container.images.len(), 1);
        assert!(container.images[0].data.is_none());
        assert!(matches!(
            container.images[0].kind,
            ImageKind::IMxImage(ref info) if info.image_type.known() == Some(&ImageType::DcdDdr)
        ));
    }
}
