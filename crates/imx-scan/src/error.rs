//! Error taxonomy for the locator/parser core.
//!
//! No variant here carries a stack trace; every candidate-format boundary is
//! a recovery point and failures are local to the candidate that produced
//! them (see `sweep`).

use thiserror::Error;

/// Errors produced while decoding or validating a single candidate
/// structure.
///
/// `Interrupted` deliberately has no representation here: a cooperative
/// cancellation is a normal outcome of a scan, not a failure, and is
/// surfaced instead through [`crate::sweep::ScanOutcome::interrupted`].
///
/// `SizeAnomaly` (spec.md §7) likewise has no variant: an oversized image
/// is not a reason to abandon the candidate, only to warn and record that
/// one image with `data = None` (see the `log::warn!` sites in
/// `imx::container` and `ivt`), so it never needs an `Err` representation.
#[derive(Debug, Error)]
pub enum Error {
    /// A decode would read past the end of the buffer.
    #[error("truncated read at offset {offset:#x}")]
    TruncatedRead { offset: usize },

    /// A post-decode structural check failed (bad tag, version, length, or
    /// count).
    #[error("unable to extract probable {format} @ {offset:#x}: {reason}")]
    StructuralInvariantViolation {
        format: &'static str,
        offset: usize,
        reason: String,
    },
}

impl Error {
    /// Wraps a `binrw` decode failure that occurred while parsing the
    /// candidate at `offset`, mapping I/O (short-read) failures to
    /// [`Error::TruncatedRead`] and anything else to a structural violation.
    pub(crate) fn from_binrw(format: &'static str, offset: usize, err: binrw::Error) -> Self {
        match err {
            binrw::Error::Io(_) => Error::TruncatedRead { offset },
            other => Error::StructuralInvariantViolation {
                format,
                offset,
                reason: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
