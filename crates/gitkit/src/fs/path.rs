//! Canonical path handling shared by every backend.
//!
//! Canonical paths have no leading or trailing separator. The root is the
//! empty string, so `"/"`, `""` and `"."` all map to the same key.

/// Canonical root key.
pub const ROOT: &str = "";

/// Normalize a path into its canonical key.
///
/// Empty and `.` segments are dropped; `..` pops the previous segment and
/// never climbs above root.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }

    segments.join("/")
}

/// Whether a canonical path is the root.
pub fn is_root(path: &str) -> bool {
    path.is_empty()
}

/// Parent of a canonical path, `None` for root.
pub fn parent_path(path: &str) -> Option<&str> {
    if is_root(path) {
        return None;
    }
    match path.rfind('/') {
        Some(idx) => Some(&path[..idx]),
        None => Some(ROOT),
    }
}

/// Last segment of a canonical path.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Proper ancestors of a canonical path, top-down, excluding root.
///
/// `ancestors("a/b/c")` yields `a`, `a/b`.
pub fn ancestors(path: &str) -> Vec<&str> {
    path.match_indices('/').map(|(idx, _)| &path[..idx]).collect()
}

/// Join a canonical base with a relative path and normalize the result.
pub fn join_path(base: &str, rest: &str) -> String {
    if is_root(base) {
        normalize_path(rest)
    } else {
        normalize_path(&format!("{base}/{rest}"))
    }
}

/// Whether `path` lies at or below `dir`.
pub fn is_within(path: &str, dir: &str) -> bool {
    is_root(dir)
        || path == dir
        || (path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/')
}

/// Path of `path` relative to `dir`; `path` must lie within `dir`.
pub fn relative_to<'a>(path: &'a str, dir: &str) -> &'a str {
    if is_root(dir) {
        path
    } else if path == dir {
        ROOT
    } else {
        &path[dir.len() + 1..]
    }
}
