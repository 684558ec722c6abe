//! Per-root watcher snapshots.
//!
//! A snapshot is the watcher's durable memory of one sync-dir: a map of
//! root-relative paths to `{kind, mtime_ms, size}`. Diffing a fresh walk
//! against it yields changes-since-last-run, so restarts do not replay the
//! whole tree. The on-disk form is a JSON file named by a hash of the root
//! path; the format is private to the watcher.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::EntryKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub kind: EntryKind,
    pub mtime_ms: i64,
    pub size: u64,
}

#[derive(Debug)]
pub struct Snapshot {
    file: PathBuf,
    entries: BTreeMap<String, SnapshotEntry>,
}

/// Snapshot file for `root` inside `state_dir/snapshots/`.
pub fn snapshot_file(state_dir: &Path, root: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(root.as_bytes());
    let digest = hasher.finalize();
    let name: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
    state_dir.join("snapshots").join(format!("{name}.json"))
}

impl Snapshot {
    /// Load the snapshot for `root`, or an empty one if none exists yet.
    pub fn load(state_dir: &Path, root: &str) -> Self {
        let file = snapshot_file(state_dir, root);
        let entries = match std::fs::read_to_string(&file) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(file = %file.display(), %err, "discarding unreadable snapshot");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self { file, entries }
    }

    /// Persist the snapshot; failure is logged, not fatal (the worst case is
    /// a full rescan next start).
    pub fn save(&self) {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let raw = serde_json::to_string(&self.entries)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            std::fs::write(&self.file, raw)
        };
        if let Err(err) = write() {
            warn!(file = %self.file.display(), %err, "cannot persist watcher snapshot");
        }
    }

    /// Remove the on-disk snapshot (root no longer watched).
    pub fn remove_file(state_dir: &Path, root: &str) {
        let _ = std::fs::remove_file(snapshot_file(state_dir, root));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&SnapshotEntry> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: String, entry: SnapshotEntry) {
        self.entries.insert(name, entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<SnapshotEntry> {
        self.entries.remove(name)
    }

    /// Remove `name/` descendants, returning their names (directory delete).
    pub fn remove_prefix(&mut self, name: &str) -> Vec<(String, SnapshotEntry)> {
        let prefix = format!("{name}/");
        let doomed: Vec<String> = self
            .entries
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        doomed
            .into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|e| (k.clone(), e)))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
