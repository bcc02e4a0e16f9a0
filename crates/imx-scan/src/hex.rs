//! Hex-rendering newtypes used throughout the report model.
//!
//! spec.md §6: "Integers render in hexadecimal; ranges render as
//! `(start, stop, step)` hex triples." These wrappers make that the
//! `Serialize` impl instead of a hand-written visitor per report field.

use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::{Serialize, Serializer};

macro_rules! hex_newtype {
    ($name:ident, $inner:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub $inner);

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                $name(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&format!("{:#x}", self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                let digits = s.strip_prefix("0x").ok_or_else(|| DeError::custom("missing 0x prefix"))?;
                <$inner>::from_str_radix(digits, 16).map($name).map_err(DeError::custom)
            }
        }
    };
}

hex_newtype!(HexU8, u8);
hex_newtype!(HexU16, u16);
hex_newtype!(HexU32, u32);
hex_newtype!(HexU64, u64);

/// A half-open byte range rendered as a `(start, stop, step)` hex triple on
/// export, matching the original tool's use of Python's `range` objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn new(start: usize, end: usize) -> Self {
        ByteRange { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.end
    }
}

impl Serialize for ByteRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("({:#x}, {:#x}, 0x1)", self.start, self.end))
    }
}

impl<'de> Deserialize<'de> for ByteRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let inner = s
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| DeError::custom("expected a (start, stop, step) triple"))?;
        let mut parts = inner.split(',').map(str::trim);
        let start = parts.next().ok_or_else(|| DeError::custom("missing start"))?;
        let end = parts.next().ok_or_else(|| DeError::custom("missing stop"))?;
        let parse_hex = |field: &str| -> Result<usize, D::Error> {
            let digits = field.strip_prefix("0x").ok_or_else(|| DeError::custom("missing 0x prefix"))?;
            usize::from_str_radix(digits, 16).map_err(DeError::custom)
        };
        Ok(ByteRange { start: parse_hex(start)?, end: parse_hex(end)? })
    }
}

/// A fixed- or variable-length byte blob (hash digests, key material,
/// signature bytes) rendered as a lowercase hex string on export instead of
/// a raw byte array.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HexBytes(pub Vec<u8>);

impl From<Vec<u8>> for HexBytes {
    fn from(value: Vec<u8>) -> Self {
        HexBytes(value)
    }
}

impl From<&[u8]> for HexBytes {
    fn from(value: &[u8]) -> Self {
        HexBytes(value.to_vec())
    }
}

impl Serialize for HexBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = String::with_capacity(self.0.len() * 2);
        for byte in &self.0 {
            s.push_str(&format!("{byte:02x}"));
        }
        serializer.serialize_str(&s)
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if !s.is_ascii() {
            return Err(DeError::custom("hex string must be ascii"));
        }
        if s.len() % 2 != 0 {
            return Err(DeError::custom("odd-length hex string"));
        }
        let digits = s.as_bytes();
        let bytes = (0..digits.len())
            .step_by(2)
            .map(|i| {
                let pair = std::str::from_utf8(&digits[i..i + 2]).expect("ascii-checked above");
                u8::from_str_radix(pair, 16).map_err(DeError::custom)
            })
            .collect::<Result<Vec<u8>, D::Error>>()?;
        Ok(HexBytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_u32_round_trips_through_json() {
        let value = HexU32(0xDEAD_BEEF);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"0xdeadbeef\"");
        assert_eq!(serde_json::from_str::<HexU32>(&json).unwrap(), value);
    }

    #[test]
    fn byte_range_round_trips_through_json() {
        let range = ByteRange::new(0x10, 0x20);
        let json = serde_json::to_string(&range).unwrap();
        assert_eq!(json, "\"(0x10, 0x20, 0x1)\"");
        assert_eq!(serde_json::from_str::<ByteRange>(&json).unwrap(), range);
    }

    #[test]
    fn hex_bytes_round_trips_through_json() {
        let bytes = HexBytes(vec![0xDE, 0xAD, 0x00, 0xFF]);
        let json = serde_json::to_string(&bytes).unwrap();
        assert_eq!(json, "\"dead00ff\"");
        assert_eq!(serde_json::from_str::<HexBytes>(&json).unwrap(), bytes);
    }
}
