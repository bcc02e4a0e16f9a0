//! A sum of `{Known(T), Unknown(raw)}`, used wherever the source falls back
//! to a bare integer when a decoded value isn't one of the named
//! enumeration members (spec.md §9 Design Notes: "Dynamic enum-or-raw-int").
//!
//! The raw integer is never dropped, even when it matches a known variant,
//! so round-tripping through [`Tagged::raw`] always recovers the original
//! bit pattern.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tagged<T, R> {
    Known(T),
    Unknown(R),
}

impl<T, R> Tagged<T, R>
where
    R: Copy,
{
    pub fn known(&self) -> Option<&T> {
        match self {
            Tagged::Known(t) => Some(t),
            Tagged::Unknown(_) => None,
        }
    }
}

impl<T, R> Tagged<T, R>
where
    T: Copy + Into<R>,
    R: Copy,
{
    /// Recovers the raw bit pattern regardless of whether it matched a
    /// known variant.
    pub fn raw(&self) -> R {
        match self {
            Tagged::Known(t) => (*t).into(),
            Tagged::Unknown(r) => *r,
        }
    }
}

impl<T, R: fmt::Display> fmt::Display for Tagged<T, R>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tagged::Known(t) => write!(f, "{t:?}"),
            Tagged::Unknown(r) => write!(f, "{r}"),
        }
    }
}

/// Builds a `Tagged<T, R>` from a raw value, using `TryFrom` to attempt the
/// known-variant conversion and falling back to `Unknown` on failure.
pub fn tag_from_raw<T, R>(raw: R) -> Tagged<T, R>
where
    T: TryFrom<R>,
    R: Copy,
{
    match T::try_from(raw) {
        Ok(t) => Tagged::Known(t),
        Err(_) => Tagged::Unknown(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    enum Color {
        Red,
        Green,
    }

    impl TryFrom<u8> for Color {
        type Error = u8;
        fn try_from(value: u8) -> Result<Self, u8> {
            match value {
                0 => Ok(Color::Red),
                1 => Ok(Color::Green),
                other => Err(other),
            }
        }
    }

    impl From<Color> for u8 {
        fn from(value: Color) -> u8 {
            value as u8
        }
    }

    #[test]
    fn known_variant_recovers_raw_bit_pattern() {
        let tagged: Tagged<Color, u8> = tag_from_raw(1);
        assert_eq!(tagged.known(), Some(&Color::Green));
        assert_eq!(tagged.raw(), 1);
    }

    #[test]
    fn unknown_variant_keeps_raw_value_round_tripping_through_json() {
        let tagged: Tagged<Color, u8> = tag_from_raw(42);
        assert_eq!(tagged.known(), None);
        assert_eq!(tagged.raw(), 42);

        let json = serde_json::to_string(&tagged).unwrap();
        let restored: Tagged<Color, u8> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, tagged);
    }

    #[test]
    fn known_variant_round_trips_through_json() {
        let tagged: Tagged<Color, u8> = tag_from_raw(0);
        let json = serde_json::to_string(&tagged).unwrap();
        let restored: Tagged<Color, u8> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, tagged);
    }
}
