//! Bounded reads of fixed-layout records (C1).
//!
//! Every format-specific parser goes through [`read_at`] instead of slicing
//! the buffer by hand: it seeks a [`std::io::Cursor`] over the byte slice to
//! `offset` and lets `binrw` decode the record according to whatever
//! per-type endianness attribute that record declared (spec.md §4.1 — "the
//! decoder never allocates for variable-length tails", all of which are
//! sliced directly from `data` by the caller instead).

use std::io::Cursor;

use binrw::BinRead;

use crate::error::{Error, Result};

/// Decodes a fixed-layout `T` starting at `offset` in `data`.
///
/// Maps a short read to [`Error::TruncatedRead`] and any other `binrw`
/// failure to a [`Error::StructuralInvariantViolation`] tagged with
/// `format`.
pub fn read_at<T>(format: &'static str, data: &[u8], offset: usize) -> Result<T>
where
    T: for<'a> BinRead<Args<'a> = ()>,
{
    if offset > data.len() {
        return Err(Error::TruncatedRead { offset });
    }
    let mut cursor = Cursor::new(data);
    cursor.set_position(offset as u64);
    T::read(&mut cursor).map_err(|err| Error::from_binrw(format, offset, err))
}

/// Returns a borrowed slice `data[start..end]`, or `None` if that range
/// exceeds the buffer. Used for the variable-length tails (hash digests,
/// key material, signature/DCD command bytes) that the fixed-layout
/// decoder never materializes itself.
pub fn slice(data: &[u8], start: usize, end: usize) -> Option<&[u8]> {
    if end < start {
        return None;
    }
    data.get(start..end)
}

/// True if at least `needed` bytes are available starting at `offset`.
pub fn has_remaining(data: &[u8], offset: usize, needed: usize) -> bool {
    data.len().saturating_sub(offset) >= needed
}
