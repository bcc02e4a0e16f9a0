//! Address-sweep locator (C5): walks a buffer, recognizes container
//! candidates, and guarantees claimed ranges are skipped rather than
//! re-scanned. Grounded on `find_container/__init__.py` and
//! `imx_find_containers/find.py`.

use crate::fit;
use crate::fit::FdtFormatter;
use crate::imx;
use crate::ivt;
use crate::report::Container;

/// Result of one buffer sweep: the containers found, in ascending order
/// of starting offset, and whether the sweep was cut short by a
/// cancellation request.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub containers: Vec<Container>,
    pub interrupted: bool,
}

/// Walks `data` from offset 0, recognizing i.MX containers, legacy
/// IVTs, and FIT/FDT blobs. `increment` is both the step taken when no
/// candidate matches and the alignment containers are rounded up to
/// (spec.md §4.5); it is clamped to at least 1. `formatter` renders the
/// optional DTS text for any FIT found. `cancelled` is polled between
/// outer-loop iterations; once it returns `true` the sweep stops and
/// returns the containers found so far (spec.md §5's single user-interrupt
/// cancellation source).
pub fn scan(data: &[u8], increment: usize, formatter: &dyn FdtFormatter, cancelled: &dyn Fn() -> bool) -> ScanOutcome {
    let increment = increment.max(1);
    let mut containers = Vec::new();
    let mut offset = 0usize;
    let mut interrupted = false;

    while offset < data.len() {
        if cancelled() {
            interrupted = true;
            break;
        }

        if imx::is_candidate(data, offset) {
            match imx::parse(data, offset) {
                Ok(mut container) => {
                    let mut discovered_fits = Vec::new();
                    for img in container.images.iter_mut() {
                        let Some(bytes) = img.data.as_deref() else { continue };
                        if !fit::is_candidate(bytes, 0) {
                            continue;
                        }
                        let Ok(parsed) = fit::parse(bytes, 0, formatter) else { continue };
                        let base = img.range().map(|r| r.start).unwrap_or(container.offset);
                        let rebased = fit::rebase(parsed, base);
                        if let Some(r) = img.range() {
                            if rebased.offset == r.start && rebased.end == r.end {
                                img.data = None;
                            }
                        }
                        discovered_fits.push(rebased);
                    }
                    let end = container.end;
                    log::debug!("i.MX Container @ {offset:#x}, {} image(s), ends @ {end:#x}", container.images.len());
                    containers.push(Container::IMx(container));
                    containers.extend(discovered_fits.into_iter().map(Container::Fit));
                    offset = end;
                    continue;
                }
                Err(err) => {
                    log::warn!("i.MX candidate @ {offset:#x} failed to parse: {err}");
                    offset += increment;
                    continue;
                }
            }
        }

        if ivt::is_candidate(data, offset) {
            match ivt::parse(data, offset) {
                Ok(container) => {
                    let end = container.end;
                    log::debug!("IVT @ {offset:#x}, ends @ {end:#x}");
                    containers.push(Container::Ivt(container));
                    offset = end;
                    continue;
                }
                Err(err) => {
                    log::warn!("IVT candidate @ {offset:#x} failed to parse: {err}");
                    offset += increment;
                    continue;
                }
            }
        }

        if fit::is_candidate(data, offset) {
            match fit::parse(data, offset, formatter) {
                Ok(container) => {
                    let end = container.end;
                    log::debug!("FIT @ {offset:#x}, ends @ {end:#x}");
                    containers.push(Container::Fit(container));
                    offset = end;
                    continue;
                }
                Err(err) => {
                    log::warn!("FIT candidate @ {offset:#x} failed to parse: {err}");
                    offset += increment;
                    continue;
                }
            }
        }

        let advanced = next_unclaimed(&containers, offset + increment);
        offset = round_up(advanced, increment);
    }

    ScanOutcome { containers, interrupted }
}

/// Repeatedly asks every container to skip `a` past any of its own
/// images until a full pass leaves `a` unchanged (spec.md §4.5
/// `next_unclaimed`). Required because images from different containers
/// may interleave: advancing past one container's image can land inside
/// another's.
fn next_unclaimed(containers: &[Container], start: usize) -> usize {
    let mut a = start;
    loop {
        let mut changed = false;
        for c in containers {
            let next = c.find_next_addr(a);
            if next != a {
                a = next;
                changed = true;
            }
        }
        if !changed {
            return a;
        }
    }
}

fn round_up(value: usize, increment: usize) -> usize {
    let rem = value % increment;
    if rem == 0 { value } else { value + (increment - rem) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{FitContainer, NullFdtFormatter};
    use crate::hex::ByteRange;
    use crate::report::{FileExt, Image, ImageKind};

    fn fdt_header(buf: &mut [u8], at: usize, totalsize: u32) {
        buf[at..at + 4].copy_from_slice(&fit::FDT_MAGIC.to_be_bytes());
        buf[at + 4..at + 8].copy_from_slice(&totalsize.to_be_bytes());
        buf[at + 8..at + 12].copy_from_slice(&0x40u32.to_be_bytes());
        buf[at + 12..at + 16].copy_from_slice(&0x20u32.to_be_bytes());
        buf[at + 16..at + 20].copy_from_slice(&0u32.to_be_bytes());
        buf[at + 20..at + 24].copy_from_slice(&17u32.to_be_bytes());
        buf[at + 24..at + 28].copy_from_slice(&16u32.to_be_bytes());
    }

    fn fake_fit(range: ByteRange) -> Container {
        Container::Fit(FitContainer {
            offset: range.start,
            end: range.end,
            totalsize: (range.len() as u32).into(),
            version: 17,
            images: vec![Image { range: Some(range), data: None, fileext: FileExt::Dtb, kind: ImageKind::Dtb }],
        })
    }

    #[test]
    fn round_up_leaves_aligned_values_untouched() {
        assert_eq!(round_up(0x100, 4), 0x100);
    }

    #[test]
    fn round_up_advances_to_next_multiple() {
        assert_eq!(round_up(0x101, 4), 0x104);
    }

    #[test]
    fn next_unclaimed_skips_through_interleaved_containers() {
        // Container A claims [0x10, 0x20); container B claims [0x18, 0x30),
        // overlapping A's tail. A single pass past A alone would land at
        // 0x20, which is still inside B.
        let containers =
            vec![fake_fit(ByteRange::new(0x10, 0x20)), fake_fit(ByteRange::new(0x18, 0x30))];
        assert_eq!(next_unclaimed(&containers, 0x10), 0x30);
    }

    #[test]
    fn next_unclaimed_is_a_noop_outside_any_claim() {
        let containers = vec![fake_fit(ByteRange::new(0x10, 0x20))];
        assert_eq!(next_unclaimed(&containers, 0x40), 0x40);
    }

    #[test]
    fn scan_finds_a_single_fit_and_advances_past_it() {
        let mut buf = vec![0u8; 0x100];
        fdt_header(&mut buf, 0x20, 0x40);

        let outcome = scan(&buf, 4, &NullFdtFormatter, &|| false);
        assert!(!outcome.interrupted);
        assert_eq!(outcome.containers.len(), 1);
        assert_eq!(outcome.containers[0].offset(), 0x20);
        assert_eq!(outcome.containers[0].end(), 0x60);
    }

    #[test]
    fn scan_stops_early_when_cancelled() {
        let buf = vec![0u8; 0x100];
        let outcome = scan(&buf, 4, &NullFdtFormatter, &|| true);
        assert!(outcome.interrupted);
        assert!(outcome.containers.is_empty());
    }
}
