//! Slash-separated database paths.
//!
//! A path with an odd number of segments addresses a collection, an even
//! number addresses a document. The root collection is the sentinel `"/"`.

/// The root collection path.
pub const ROOT: &str = "/";

/// Path segment separator.
pub const SEPARATOR: char = '/';

/// Normalizes a path: collapses repeated separators and strips leading and
/// trailing ones. An empty path normalizes to [`ROOT`].
///
/// # Examples
///
/// ```rust
/// use fire_migrate::models::path::normalize;
///
/// assert_eq!(normalize("/a//b/"), "a/b");
/// assert_eq!(normalize(""), "/");
/// ```
#[must_use]
pub fn normalize(path: &str) -> String {
    let joined = segments(path).collect::<Vec<_>>().join("/");
    if joined.is_empty() {
        ROOT.to_string()
    } else {
        joined
    }
}

/// Normalizes a list of path parts joined together.
#[must_use]
pub fn normalize_parts<S: AsRef<str>>(parts: &[S]) -> String {
    let joined = parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("/");
    normalize(&joined)
}

/// Iterates over the non-empty segments of a path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Returns the number of segments in the path. The root has zero.
#[must_use]
pub fn depth(path: &str) -> usize {
    segments(path).count()
}

/// Returns whether the path denotes the root collection.
#[must_use]
pub fn is_root(path: &str) -> bool {
    depth(path) == 0
}

/// Returns whether the path addresses a collection (odd segment count, or root).
#[must_use]
pub fn is_collection_path(path: &str) -> bool {
    let n = depth(path);
    n == 0 || n % 2 == 1
}

/// Returns whether the path addresses a document (even, non-zero segment count).
#[must_use]
pub fn is_document_path(path: &str) -> bool {
    !is_collection_path(path)
}

/// Returns the last segment of the path, or an empty string for the root.
#[must_use]
pub fn last_segment(path: &str) -> &str {
    segments(path).last().unwrap_or("")
}

/// Joins a child segment onto a parent path.
#[must_use]
pub fn join(parent: &str, child: &str) -> String {
    normalize_parts(&[parent, child])
}

/// Returns the parent path, or `None` for single-segment paths and the root.
#[must_use]
pub fn parent(path: &str) -> Option<String> {
    let parts: Vec<&str> = segments(path).collect();
    if parts.len() < 2 {
        return None;
    }
    Some(parts[..parts.len() - 1].join("/"))
}

/// Returns whether `path` equals `ancestor` or lies beneath it.
///
/// The comparison is segment-aware: `users2` is not within `users`.
/// Every path is within the root.
#[must_use]
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if is_root(ancestor) {
        return true;
    }
    let path = normalize(path);
    let ancestor = normalize(ancestor);
    format!("{path}/").starts_with(&format!("{ancestor}/"))
}
