//! Path normalization and change-token helpers.
//!
//! Local and remote paths are carried as strings throughout the store; these
//! helpers keep the two namespaces consistent: sync roots lose their trailing
//! slash, remote roots gain a leading one, and prefix tests only match on
//! `/` boundaries so `/sync/a` never covers `/sync/ab`.

/// Strip a trailing `/` from a sync root, leaving `/` itself intact.
pub fn normalize_root(root: &str) -> String {
    if root.len() > 1 {
        root.trim_end_matches('/').to_string()
    } else {
        root.to_string()
    }
}

/// Normalize a remote root: ensure a leading `/`, drop any trailing one.
pub fn normalize_remote_root(root: &str) -> String {
    let trimmed = root.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Join a watch root and a root-relative name into a local path.
pub fn join_local(watch_root: &str, name: &str) -> String {
    format!("{}/{}", normalize_root(watch_root), name)
}

/// Join a remote root and a root-relative name into a remote path.
pub fn join_remote(remote_root: &str, name: &str) -> String {
    let root = normalize_remote_root(remote_root);
    if root == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", root, name)
    }
}

/// Cheap content-change proxy: `"mtime_ms:size"`.
pub fn change_token(mtime_ms: i64, size: u64) -> String {
    format!("{}:{}", mtime_ms, size)
}

/// True when `path` equals `prefix` or lives underneath it.
///
/// Matches only on `/` boundaries: `/sync/a` covers `/sync/a/b.txt` but not
/// `/sync/ab.txt`.
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    if path == prefix {
        return true;
    }
    let prefix = normalize_root(prefix);
    if prefix == "/" {
        return path.starts_with('/');
    }
    path.len() > prefix.len()
        && path.starts_with(&prefix)
        && path.as_bytes()[prefix.len()] == b'/'
}

/// The path relative to `root`, or `None` when `path` is outside it.
pub fn relative_to(path: &str, root: &str) -> Option<String> {
    let root = normalize_root(root);
    if !path_has_prefix(path, &root) {
        return None;
    }
    if path == root {
        return Some(String::new());
    }
    Some(path[root.len() + 1..].to_string())
}
