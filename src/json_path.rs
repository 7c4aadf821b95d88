//! Dotted-path resolution through a nested JSON mapping (spec §4.7).

use serde_json::Value;

/// Resolve `a.b.c` through `root`, descending one segment at a time.
///
/// Returns `None` as soon as the current node is not an object or the next
/// segment is absent. A trailing empty segment (`"a.b."`) resolves to the
/// parent's current child rather than erroring. Non-string terminals are
/// returned as-is; the caller decides whether that's usable (spec §4.3
/// requires a string for parent/routing fields).
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }

    let mut node = root;
    for segment in path.split('.') {
        let obj = node.as_object()?;
        node = if segment.is_empty() {
            node
        } else {
            obj.get(segment)?
        };
    }
    Some(node)
}

/// Convenience wrapper for spec §4.3's parent/routing extraction: resolves
/// `path` and returns it only if it is a non-empty string.
pub fn resolve_string_field<'a>(root: &'a Value, path: &str) -> Option<&'a str> {
    resolve_path(root, path)?.as_str()
}
