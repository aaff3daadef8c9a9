//! Name and path splitting.
//!
//! Device and alias names double as paths: `"dsk/da0s1"` places a leaf
//! `da0s1` below an auto-created directory `dsk`. Empty segments (leading,
//! trailing or doubled separators) are ignored.

/// Path separator.
pub(crate) const SEPARATOR: char = '/';

/// Split `full` at its last separator into `(directory path, leaf name)`.
///
/// ```text
/// "a/b/c/foo" -> (Some("a/b/c"), "foo")
/// "foo"       -> (None, "foo")
/// ```
pub(crate) fn split_name(full: &str) -> (Option<&str>, &str) {
    match full.rsplit_once(SEPARATOR) {
        Some((dir, name)) => (Some(dir), name),
        None => (None, full),
    }
}

/// Non-empty path segments in order.
pub(crate) fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Whether `name` can be used as a single directory entry.
pub(crate) fn is_valid_entry_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(SEPARATOR)
}

/// Join path segments with the separator.
pub(crate) fn join<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for seg in segments {
        if !out.is_empty() {
            out.push(SEPARATOR);
        }
        out.push_str(seg);
    }
    out
}
