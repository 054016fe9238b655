//! Validation and manipulation of virtual paths.
//!
//! Paths are forward-slash separated and relative to the filesystem root,
//! which is named by the literal [`ROOT`]. No segment may be empty, `"."`
//! or `".."`; leading and trailing slashes and backslashes are rejected.

/// The root of every filesystem.
pub const ROOT: &str = ".";

/// Reports whether `path` is well formed.
pub fn valid(path: &str) -> bool {
    if path == ROOT {
        return true;
    }
    if path.is_empty() || path.contains('\\') {
        return false;
    }
    path.split('/').all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// Reduces `path` to canonical form: forward slashes, no leading slash, no
/// `.`/`..` or empty segments. An empty result collapses to [`ROOT`].
pub fn clean(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        ROOT.to_owned()
    } else {
        segments.join("/")
    }
}

/// The directory containing `path`; [`ROOT`] for top-level names.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => ROOT,
    }
}

/// The final segment of `path`.
pub fn base(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Joins `dir` and `name`, collapsing the root on either side.
pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        name.to_owned()
    } else if name == ROOT {
        dir.to_owned()
    } else {
        format!("{dir}/{name}")
    }
}

/// True when `path` equals `prefix` or lies beneath it.
pub fn has_prefix(path: &str, prefix: &str) -> bool {
    if prefix == ROOT {
        return true;
    }
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'/')
}

/// Strips `prefix` from `path`; the exact match maps to [`ROOT`].
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == ROOT {
        return Some(path);
    }
    if path == prefix {
        return Some(ROOT);
    }
    if has_prefix(path, prefix) {
        Some(&path[prefix.len() + 1..])
    } else {
        None
    }
}

/// Iterates the `/`-prefixes of `path` root-first: `a`, `a/b`, `a/b/c`.
pub fn prefixes(path: &str) -> impl Iterator<Item = &str> {
    let path_ref = path;
    path.char_indices()
        .filter_map(move |(idx, ch)| (ch == '/').then(|| &path_ref[..idx]))
        .chain(std::iter::once(path))
}
