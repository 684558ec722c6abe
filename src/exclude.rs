//! Exclusion-pattern matching with a compiled-glob cache.
//!
//! Each config entry carries a scope path (`"/"` = global, otherwise an
//! absolute prefix) and glob strings. A glob containing `/` matches the
//! whole path relative to the sync-dir root; a bare glob matches each path
//! segment. `*` and `?` stop at separators, `**` crosses them.
//!
//! Compiled matchers are cached behind a mutex; the cache is invalidated
//! when the exclude config changes.

use globset::{GlobBuilder, GlobMatcher};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

use crate::config::ExcludeEntry;
use crate::paths;

/// Process-wide cache of compiled globs, owned by the daemon and passed to
/// the classifier by reference.
pub struct GlobCache {
    compiled: Mutex<HashMap<String, Option<GlobMatcher>>>,
}

impl GlobCache {
    pub fn new() -> Self {
        Self {
            compiled: Mutex::new(HashMap::new()),
        }
    }

    /// Compile (or fetch) the matcher for one glob string. Invalid globs are
    /// cached as misses so they only warn once.
    fn matcher(&self, glob: &str) -> Option<GlobMatcher> {
        let mut cache = self
            .compiled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache
            .entry(glob.to_string())
            .or_insert_with(|| {
                match GlobBuilder::new(glob).literal_separator(true).build() {
                    Ok(compiled) => Some(compiled.compile_matcher()),
                    Err(err) => {
                        warn!(glob, %err, "ignoring invalid exclude glob");
                        None
                    }
                }
            })
            .clone()
    }

    /// Drop every compiled matcher (exclude config changed).
    pub fn invalidate(&self) {
        self.compiled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl Default for GlobCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `local_path` (under `sync_root`) is excluded by any entry.
pub fn is_excluded(
    cache: &GlobCache,
    entries: &[ExcludeEntry],
    sync_root: &str,
    local_path: &str,
) -> bool {
    let Some(relative) = paths::relative_to(local_path, sync_root) else {
        return false;
    };
    if relative.is_empty() {
        return false;
    }

    for entry in entries {
        let in_scope =
            entry.path == "/" || paths::path_has_prefix(local_path, &entry.path);
        if !in_scope {
            continue;
        }
        for glob in &entry.globs {
            let Some(matcher) = cache.matcher(glob) else {
                continue;
            };
            let hit = if glob.contains('/') {
                matcher.is_match(Path::new(&relative))
            } else {
                relative
                    .split('/')
                    .any(|segment| matcher.is_match(Path::new(segment)))
            };
            if hit {
                return true;
            }
        }
    }
    false
}
