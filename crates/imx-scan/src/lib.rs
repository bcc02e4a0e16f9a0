//! Locator and parser for i.MX boot-time container formats: version-0
//! Authentication Containers, legacy Image Vector Tables, and
//! FIT/FDT blobs embedded in flash images and firmware dumps.
//!
//! [`sweep::scan`] is the entry point; it returns a [`report::Report`]-ready
//! list of [`report::Container`] values for one in-memory buffer. Everything
//! outside that — reading files, walking directories, writing the report,
//! extracting payloads to disk — is deliberately kept out of this crate
//! (see the `imx-scan-cli` binary).

pub mod byteview;
pub mod enumish;
pub mod error;
pub mod fit;
pub mod hex;
pub mod imx;
pub mod ivt;
pub mod report;
pub mod sweep;

pub use error::{Error, Result};
pub use fit::FdtFormatter;
pub use report::{Container, Report};
pub use sweep::{ScanOutcome, scan};
