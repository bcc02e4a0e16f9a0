//! Extracted-file naming (spec.md §6), supplemented from
//! `find_container/utils.py::_path_to_filename`/`export`.

use std::path::Path;

pub fn sanitize_source_path(path: &Path) -> String {
    let replaced = path.to_string_lossy().replace(['/', '\\'], "_");
    replaced.trim_start_matches(|c| c == '.' || c == '_').to_string()
}

/// `<sanitized_source_path>-<image_offset_hex_uppercase>.<ext>`
pub fn extracted_filename(source: &Path, offset: usize, ext: &str) -> String {
    format!("{}-{:X}.{ext}", sanitize_source_path(source), offset)
}
