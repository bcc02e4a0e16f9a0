//! In-memory report tree (C6): the aggregated result of a scan and the
//! types every format-specific parser (C2/C3/C4) produces.
//!
//! This tree is frozen once the sweep that built it returns (spec.md §3
//! Lifecycle) — nothing here mutates after [`crate::sweep::scan`] hands it
//! back, except the one documented FIT fix-up exception, which happens
//! before either container is exposed to the caller.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::enumish::Tagged;
use crate::fit::FitContainer;
use crate::hex::{ByteRange, HexU32};
use crate::imx::ImxContainer;
use crate::ivt::Ivt;

/// Extension an extracted image payload would be written with (spec.md
/// §6 "Extracted file naming"). Modeled as an enum rather than a bare
/// `&'static str` so the report model can derive `Deserialize` as well as
/// `Serialize` (spec.md §8 round-trip property).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileExt {
    Bin,
    Dtb,
    Dts,
}

impl FileExt {
    pub fn as_str(self) -> &'static str {
        match self {
            FileExt::Bin => "bin",
            FileExt::Dtb => "dtb",
            FileExt::Dts => "dts",
        }
    }
}

impl std::fmt::Display for FileExt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind-tagged payload carried by an [`Image`]; only the fields
/// meaningful to that variant are present (spec.md §9: redesign of the
/// dict-shaped Image record into a tagged record).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ImageKind {
    /// One image table entry from an i.MX Authentication Container.
    IMxImage(Box<crate::imx::ImxImageInfo>),
    /// The single application payload referenced by an IVT's `BootData`.
    IvtApp { entry: HexU32 },
    /// Raw FDT/DTB bytes of a FIT blob.
    Dtb,
    /// Textual device-tree-source rendering of a FIT blob, produced by an
    /// external formatter. Only ever present when a [`crate::fit::FdtFormatter`]
    /// was supplied and succeeded.
    Dts,
    /// An IVT's CSF block, recorded as an opaque range (spec.md §9 Open
    /// Questions — no structural CSF parsing here).
    OpaqueCsf,
}

/// One materialized or referenced byte range belonging to a container.
///
/// `data` is `None` when the image is referenced but not materialized: a
/// `DCD_DDR` image declared with size 0, a FIT fully subsumed by its parent
/// image (the fix-up in [`crate::fit`]), or an image whose declared extent
/// exceeded the buffer (spec.md §3 invariant: "if `data` is present,
/// `len(data) == end - offset`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub range: Option<ByteRange>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Vec<u8>>,
    pub fileext: FileExt,
    pub kind: ImageKind,
}

impl Image {
    pub fn range(&self) -> Option<ByteRange> {
        self.range
    }
}

/// A located structure: format, absolute extent, and its images.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "format")]
pub enum Container {
    IMx(ImxContainer),
    Ivt(Ivt),
    Fit(FitContainer),
}

impl Container {
    pub fn offset(&self) -> usize {
        match self {
            Container::IMx(c) => c.offset,
            Container::Ivt(c) => c.offset,
            Container::Fit(c) => c.offset,
        }
    }

    pub fn end(&self) -> usize {
        match self {
            Container::IMx(c) => c.end,
            Container::Ivt(c) => c.end,
            Container::Fit(c) => c.end,
        }
    }

    pub fn images(&self) -> &[Image] {
        match self {
            Container::IMx(c) => &c.images,
            Container::Ivt(c) => &c.images,
            Container::Fit(c) => &c.images,
        }
    }

    /// Mutable access to this container's images, used by the CLI to
    /// strip materialized payload bytes when `--include-image-contents`
    /// was not requested (the core always materializes what it reads;
    /// range-only reporting is a presentation choice at the boundary).
    pub fn images_mut(&mut self) -> &mut [Image] {
        match self {
            Container::IMx(c) => &mut c.images,
            Container::Ivt(c) => &mut c.images,
            Container::Fit(c) => &mut c.images,
        }
    }

    /// This container's CSF block, if any (IVT only). Kept separate from
    /// [`Container::images`] because its range routinely overlaps the
    /// application payload's range (spec.md §4.3), which would violate
    /// the non-overlap invariant [`Container::find_next_addr`] relies on.
    pub fn csf(&self) -> Option<&Image> {
        match self {
            Container::Ivt(c) => c.csf.as_ref(),
            Container::IMx(_) | Container::Fit(_) => None,
        }
    }

    /// Mutable access to this container's CSF block, if any.
    pub fn csf_mut(&mut self) -> Option<&mut Image> {
        match self {
            Container::Ivt(c) => c.csf.as_mut(),
            Container::IMx(_) | Container::Fit(_) => None,
        }
    }

    /// Finds the next address at or after `addr` that does not fall inside
    /// one of this container's own images (spec.md §4.5
    /// `find_next_addr`). Images within one container do not overlap but
    /// need not be contiguous, so this may need to walk more than one
    /// image before returning. The CSF block is deliberately excluded —
    /// see [`Container::csf`].
    pub fn find_next_addr(&self, addr: usize) -> usize {
        let mut addr = addr;
        loop {
            let hit = self
                .images()
                .iter()
                .find_map(|img| img.range().filter(|r| r.contains(addr)));
            match hit {
                Some(range) => addr = range.end,
                None => return addr,
            }
        }
    }
}

/// A mapping `source_path -> [Container]`, the top-level report spec.md §6
/// describes. Serialization is delegated entirely to `serde` — this type
/// carries no bespoke writer logic.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Report {
    pub files: BTreeMap<PathBuf, Vec<Container>>,
}

impl Report {
    pub fn new() -> Self {
        Report::default()
    }

    pub fn insert(&mut self, path: PathBuf, containers: Vec<Container>) {
        if !containers.is_empty() {
            self.files.insert(path, containers);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A categorical value that may fall outside the enumeration the wire
/// format declares for it, retained as a raw integer either way (spec.md
/// §9). Re-exported here so downstream report types don't need to import
/// [`crate::enumish`] directly.
pub type Categorical<T, R> = Tagged<T, R>;
