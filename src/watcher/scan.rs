//! Full directory walks for startup scans and reconciliation.

use std::path::Path;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use super::EntryKind;

/// One observed filesystem entry, relative to the scanned root.
#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub name: String,
    pub kind: EntryKind,
    pub mtime_ms: i64,
    pub size: u64,
    /// False when metadata could not be read; reported as `exists=false`.
    pub readable: bool,
}

/// Milliseconds since the epoch for a file's mtime, zero when unavailable.
pub fn mtime_ms(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Walk `root` and return every file and directory underneath it, sorted by
/// relative name. The root itself is not an entry. A walk error for a
/// subtree surfaces as an unreadable entry rather than failing the scan.
pub fn scan_root(root: &str) -> Vec<ScanEntry> {
    let root_path = Path::new(root);
    let mut entries = Vec::new();

    for item in WalkDir::new(root_path).follow_links(false) {
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                if let Some(path) = err.path() {
                    if let Some(name) = relative_name(root_path, path) {
                        entries.push(ScanEntry {
                            name,
                            kind: EntryKind::File,
                            mtime_ms: 0,
                            size: 0,
                            readable: false,
                        });
                    }
                }
                continue;
            }
        };
        if item.path() == root_path {
            continue;
        }
        let Some(name) = relative_name(root_path, item.path()) else {
            continue;
        };
        match item.metadata() {
            Ok(meta) => {
                let kind = if meta.is_dir() { EntryKind::Dir } else { EntryKind::File };
                let size = if meta.is_dir() { 0 } else { meta.len() };
                entries.push(ScanEntry {
                    name,
                    kind,
                    mtime_ms: mtime_ms(&meta),
                    size,
                    readable: true,
                });
            }
            Err(_) => entries.push(ScanEntry {
                name,
                kind: EntryKind::File,
                mtime_ms: 0,
                size: 0,
                readable: false,
            }),
        }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        .filter(|name| !name.is_empty())
}
