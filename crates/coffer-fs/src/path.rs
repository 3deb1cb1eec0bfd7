//! Logical path parsing.
//!
//! A logical path names one entry as `{id}/{name}`, e.g. `"12345/document.pdf"`.

use coffer_store::EntryId;

/// Split a logical path into its entry id and name.
///
/// Returns `None` unless `path` is a clean relative path of exactly two
/// segments whose first segment is a decimal id.
pub(crate) fn parse_path(path: &str) -> Option<(EntryId, &str)> {
    if !is_clean_relative(path) {
        return None;
    }
    let (id, name) = path.split_once('/')?;
    if name.contains('/') || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((id.parse().ok()?, name))
}

/// No leading or trailing slash, and no empty, `.` or `..` segments.
fn is_clean_relative(path: &str) -> bool {
    path.split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}
