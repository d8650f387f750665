//! Helpers for slash-separated node paths.
//!
//! Paths are absolute (`/a/b/c`). The root is `/` and has no parent.

/// The root path of the node tree.
pub const ROOT: &str = "/";

/// Returns true if `path` is a well-formed absolute node path.
///
/// A valid path starts with `/`, has no empty segments and does not end with
/// `/` unless it is the root itself.
pub fn is_valid(path: &str) -> bool {
    if path == ROOT {
        return true;
    }
    if !path.starts_with('/') || path.ends_with('/') {
        return false;
    }
    path[1..]
        .split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// Joins a parent path and a child name.
pub fn join(parent: &str, child: &str) -> String {
    if parent == ROOT {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// Returns the parent of `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Returns the last segment of `path` (empty for the root).
pub fn name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
