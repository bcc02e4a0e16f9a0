//! Wire-format records and enumerations for the i.MX Authentication
//! Container (version 0). All multi-byte fields are little-endian
//! (spec.md §6).

use binrw::binrw;
use serde::{Deserialize, Serialize};

/// NXP tools cap the number of images per container at 8.
pub const MAX_IMAGES_PER_CONTAINER: u8 = 8;
/// NXP docs say a container header should be no more than 8 KiB; used as a
/// sanity check on the decoded `length` field.
pub const MAX_CONTAINER_SIZE: u16 = 8192;

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u8,
    pub length: u16,
    pub tag: u8,
    pub flags: u32,
    pub sw_ver: u16,
    pub fuse_ver: u8,
    pub num_images: u8,
    pub sig_offset: u32,
}

impl ContainerHeader {
    pub const SIZE: usize = 16;
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub offset: u32,
    pub size: u32,
    pub dest: u64,
    pub entry: u64,
    pub flags: u32,
    pub metadata: u32,
    pub hash: [u8; 64],
    pub iv: [u8; 32],
}

impl ImageHeader {
    pub const SIZE: usize = 128;
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureBlockHeader {
    pub version: u8,
    pub length: u16,
    pub tag: u8,
    pub cert_offset: u16,
    pub srk_table_offset: u16,
    pub sig_offset: u16,
    pub dek_offset: u16,
}

impl SignatureBlockHeader {
    pub const SIZE: usize = 12;
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrkTableHeader {
    pub tag: u8,
    pub length: u16,
    pub version: u8,
}

impl SrkTableHeader {
    pub const SIZE: usize = 4;
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrkRecordHeader {
    pub tag: u8,
    pub length: u16,
    pub alg: u8,
    pub hash: u8,
    pub key_size: u8,
    pub flags: u8,
    #[brw(pad_before = 1)]
    pub mod_len: u16,
    pub exp_len: u16,
}

impl SrkRecordHeader {
    pub const SIZE: usize = 12;
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificateHeader {
    pub version: u8,
    pub length: u16,
    pub tag: u8,
    pub sig_offset: u16,
    pub perms_inv: u8,
    pub perms: u8,
}

impl CertificateHeader {
    pub const SIZE: usize = 8;
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureHeader {
    pub version: u8,
    pub length: u16,
    #[brw(pad_after = 4)]
    pub tag: u8,
}

impl SignatureHeader {
    pub const SIZE: usize = 8;
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DekHeader {
    pub version: u8,
    pub length: u16,
    pub tag: u8,
    pub flags: u8,
    pub size: u8,
    pub alg: u8,
    pub mode: u8,
}

impl DekHeader {
    pub const SIZE: usize = 8;
}

macro_rules! named_enum {
    ($(#[$meta:meta])* $name:ident: $repr:ty { $($variant:ident = $value:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant = $value),+
        }

        impl TryFrom<$repr> for $name {
            type Error = $repr;
            fn try_from(value: $repr) -> Result<Self, $repr> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(other),
                }
            }
        }

        impl From<$name> for $repr {
            fn from(value: $name) -> $repr {
                value as $repr
            }
        }
    };
}
pub(crate) use named_enum;

macro_rules! named_u8_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:expr),+ $(,)? }) => {
        named_enum!($(#[$meta])* $name: u8 { $($variant = $value),+ });
    };
}
pub(crate) use named_u8_enum;

named_u8_enum!(
    /// Known values for [`ContainerHeader::tag`].
    HeaderTag {
        Dek = 0x81,
        Container = 0x87,
        Message = 0x89,
        SignatureBlock = 0x90,
        Certificate = 0xAF,
        SrkTable = 0xD7,
        Signature = 0xD8,
        Srk = 0xE1,
    }
);

named_u8_enum!(SrkSet { NoAuth = 0x00, Nxp = 0x01, Oem = 0x02 });

named_u8_enum!(
    ImageType {
        Csf = 0x01,
        Scd = 0x02,
        Exe = 0x03,
        Data = 0x04,
        DcdDdr = 0x05,
        Seco = 0x06,
        Provisioning = 0x07,
        Dek = 0x08,
        V2xPrimary = 0x0B,
        V2xSecondary = 0x0C,
        V2xRom = 0x0D,
        V2xDummy = 0x0E,
    }
);

named_u8_enum!(
    CoreType {
        Sc = 0x01,
        Cm40 = 0x02,
        Cm41 = 0x03,
        A53 = 0x04,
        A72 = 0x05,
        Seco = 0x06,
        V2xP = 0x09,
        V2xS = 0x0A,
    }
);

named_u8_enum!(HashType { Sha2_256 = 0x00, Sha2_384 = 0x01, Sha2_512 = 0x02 });

named_u8_enum!(AlgType { Rsa = 0x21, Ecdsa = 0x27 });

named_u8_enum!(EcdsaCurve { Prime256v1 = 0x01, Sec348r1 = 0x02, Sec521r1 = 0x03 });

named_u8_enum!(RsaKeySize { Rsa2048 = 0x05, Rsa3072 = 0x06, Rsa4096 = 0x07 });

named_u8_enum!(AesKeySize { Aes128 = 0x10, Aes192 = 0x18, Aes256 = 0x20 });

named_u8_enum!(EncryptionAlg { Aes = 0x55 });

named_u8_enum!(EncryptionMode { Cbc = 0x66 });

/// Certificate permission bits. `ApplicationDebug` and `Cm4Debug` alias the
/// same bit value (`1 << 2`) in the source NXP tooling; both names are kept
/// so a decode can report either meaning (spec.md §9 Open Questions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertPermissions(pub u8);

impl CertPermissions {
    pub const CONTAINER_SIGNING: u8 = 1 << 0;
    pub const SCU_DEBUG: u8 = 1 << 1;
    pub const CM4_DEBUG: u8 = 1 << 2;
    pub const APP_DEBUG: u8 = 1 << 2;
    pub const FUSE_1: u8 = 1 << 4;
    pub const FUSE_2: u8 = 1 << 5;

    pub fn has(&self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

named_enum!(
    /// Decoded CPU identifier, from a 10-bit subfield of [`ImageHeader::metadata`].
    CpuId: u16 {
        ScRA350 = 508,
        ScRA530 = 1,
        ScRA720 = 6,
        ScRM40Pid0 = 278,
        ScRM41Pid0 = 298,
    }
);

named_enum!(
    /// Decoded message-unit identifier, from a subfield of [`ImageHeader::metadata`].
    MuId: u16 {
        ScRMu0a = 213,
        ScRM40Mu1a = 297,
        ScRM41Mu1a = 317,
    }
);

named_enum!(
    /// Decoded partition identifier, from a subfield of [`ImageHeader::metadata`].
    PartitionId: u8 {
        M4 = 0,
        Ap = 1,
    }
);
