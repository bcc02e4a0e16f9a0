//! i.MX Authentication Container parser (C2).

mod container;
pub mod types;

pub use container::{
    Certificate, ContainerHeaderInfo, Dek, ImxContainer, ImxImageInfo, Signature, SignatureBlock,
    SrkFlags, SrkRecord, SrkTable, is_candidate, parse,
};
