//! Request path normalization and depth-aware entry matching.
//!
//! Archives exported from other tools often wrap everything in one top-level
//! folder (`public/index.html`, `public/img/logo.png`). A *depth* of `n`
//! strips the first `n` segments from every entry name before comparing it
//! with the requested path, so that content is addressed as if the folder
//! did not exist.

use crate::zip::ZipEntry;

/// Document substituted for directory requests.
pub const DEFAULT_DOCUMENT: &str = "index.html";

/// Convert every separator variant to `/`.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Remove the first `depth` `/`-delimited segments of `path`.
///
/// If `path` has fewer than `depth` separators the whole string is consumed
/// and the result is empty. This is deliberate: a top-level `index.html` is
/// not reachable at depth 1, rather than matching as its untouched tail.
pub fn strip_leading_segments(path: &str, depth: usize) -> &str {
    let mut rest = path;
    for _ in 0..depth {
        match rest.find('/') {
            Some(index) => rest = &rest[index + 1..],
            None => return "",
        }
    }
    rest
}

/// Predicate selecting the entry addressed by `requested` at `depth`.
///
/// Directory entries are stored with a trailing `/`; it is ignored so that a
/// request for `img` finds `public/img/`.
pub fn matcher(requested: &str, depth: usize) -> impl Fn(&ZipEntry) -> bool + Send + 'static {
    let find = normalize(requested);
    move |entry: &ZipEntry| {
        let name = normalize(&entry.name);
        let name = name.strip_suffix('/').unwrap_or(&name);
        if depth == 0 {
            name == find
        } else {
            strip_leading_segments(name, depth) == find
        }
    }
}

/// `""` and anything ending in a separator names a directory.
pub fn is_directory_request(path: &str) -> bool {
    path.is_empty() || path.ends_with('/') || path.ends_with('\\')
}

/// Append [`DEFAULT_DOCUMENT`] to directory requests, leave others alone.
pub fn with_default_document(path: &str) -> String {
    if is_directory_request(path) {
        format!("{path}{DEFAULT_DOCUMENT}")
    } else {
        path.to_string()
    }
}

/// True if `path` names exactly one file inside whatever root it is joined onto.
///
/// Rejects absolute paths, drive prefixes, NUL bytes and empty, `.` or `..`
/// segments. Empty and `.` segments would alias another cache file.
pub fn is_safe_relative(path: &str) -> bool {
    let path = normalize(path);
    !path.contains('\0')
        && !has_drive_prefix(&path)
        && path
            .split('/')
            .all(|segment| !matches!(segment, "" | "." | "..") && is_portable_segment(segment))
}

/// First segment is a drive like `C:`.
fn has_drive_prefix(path: &str) -> bool {
    let first = path.split('/').next().unwrap_or_default().as_bytes();
    first.len() == 2 && first[0].is_ascii_alphabetic() && first[1] == b':'
}

#[cfg(windows)]
fn is_portable_segment(segment: &str) -> bool {
    !segment.contains(':')
}

#[cfg(not(windows))]
fn is_portable_segment(_segment: &str) -> bool {
    true
}
