//! Filesystem watcher: startup scans, debounced live events, reconciliation.
//!
//! Each sync-dir gets its own snapshot and its own debounced subscription.
//! All deliveries go through one handler as batches of [`FileChange`]s,
//! coalesced per path with last-observed metadata winning, sorted by name so
//! the same filesystem history always produces the same batch order.
//!
//! The watcher never fails a batch: an entry it cannot stat is reported as
//! `exists = false`.

pub mod scan;
pub mod snapshot;

use anyhow::{Context, Result};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::paths;
use self::scan::ScanEntry;
use self::snapshot::{Snapshot, SnapshotEntry};

/// Debounce window for live filesystem events.
pub const WATCHER_DEBOUNCE_MS: u64 = 200;

/// Entry type on the wire: `f` or `d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    #[serde(rename = "f")]
    File,
    #[serde(rename = "d")]
    Dir,
}

/// One observed change, scoped to a sync-dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// The sync-dir root this change belongs to.
    pub watch_root: String,
    /// Path relative to `watch_root`.
    pub name: String,
    pub kind: EntryKind,
    pub exists: bool,
    /// Whether the path was unknown to the snapshot when the batch was built.
    pub is_new: bool,
    pub mtime_ms: i64,
    pub size: u64,
}

/// Receives batches; invoked on the watcher's delivery threads.
pub type ChangeHandler = Arc<dyn Fn(&str, Vec<FileChange>) + Send + Sync>;

struct RootWatch {
    // Kept alive for the subscription; dropping releases the OS watch.
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    state: Arc<Mutex<Snapshot>>,
}

/// Watcher over the active set of sync-dirs.
pub struct SyncWatcher {
    state_dir: PathBuf,
    debounce: Duration,
    handler: ChangeHandler,
    roots: Mutex<HashMap<String, RootWatch>>,
}

impl SyncWatcher {
    pub fn new(state_dir: PathBuf, handler: ChangeHandler) -> Self {
        Self::with_debounce(state_dir, handler, Duration::from_millis(WATCHER_DEBOUNCE_MS))
    }

    pub fn with_debounce(state_dir: PathBuf, handler: ChangeHandler, debounce: Duration) -> Self {
        Self {
            state_dir,
            debounce,
            handler,
            roots: Mutex::new(HashMap::new()),
        }
    }

    /// Start watching `root`: deliver the startup batch (changes since the
    /// last snapshot, or the full tree when none exists), then subscribe for
    /// live events.
    pub fn add_root(&self, root: &str) -> Result<()> {
        let root = paths::normalize_root(root);
        let mut snapshot = Snapshot::load(&self.state_dir, &root);
        let batch = diff_scan(&root, &mut snapshot, DeliverMode::ChangedOnly);
        snapshot.save();
        if !batch.is_empty() {
            (self.handler)(&root, batch);
        }

        let state = Arc::new(Mutex::new(snapshot));
        let debouncer = self.subscribe(&root, state.clone())?;
        self.lock_roots()
            .insert(root, RootWatch { _debouncer: debouncer, state });
        Ok(())
    }

    fn subscribe(
        &self,
        root: &str,
        state: Arc<Mutex<Snapshot>>,
    ) -> Result<Debouncer<notify::RecommendedWatcher>> {
        let handler = self.handler.clone();
        let root_owned = root.to_string();
        let mut debouncer = new_debouncer(self.debounce, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let event_paths: Vec<PathBuf> =
                        events.into_iter().map(|e| e.path).collect();
                    let batch = {
                        let mut snapshot = state
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        let batch = live_batch(&root_owned, &event_paths, &mut snapshot);
                        snapshot.save();
                        batch
                    };
                    if !batch.is_empty() {
                        handler(&root_owned, batch);
                    }
                }
                Err(err) => warn!(root = %root_owned, %err, "watcher backend error"),
            }
        })
        .context("cannot create filesystem watcher")?;

        debouncer
            .watcher()
            .watch(Path::new(root), RecursiveMode::Recursive)
            .with_context(|| format!("cannot watch {root}"))?;
        debug!(root, "watching");
        Ok(debouncer)
    }

    /// Stop watching `root` and drop its snapshot (the dir is no longer
    /// covered, so the next add starts from a full scan).
    pub fn remove_root(&self, root: &str) {
        let root = paths::normalize_root(root);
        if self.lock_roots().remove(&root).is_some() {
            Snapshot::remove_file(&self.state_dir, &root);
            debug!(root = %root, "released watch");
        }
    }

    pub fn roots(&self) -> Vec<String> {
        self.lock_roots().keys().cloned().collect()
    }

    /// Re-scan every root from scratch, delivering a full batch per root:
    /// every on-disk entry plus deletions against the snapshot.
    pub fn reconcile(&self) {
        let roots: Vec<(String, Arc<Mutex<Snapshot>>)> = self
            .lock_roots()
            .iter()
            .map(|(root, watch)| (root.clone(), watch.state.clone()))
            .collect();
        for (root, state) in roots {
            let batch = {
                let mut snapshot = state
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let batch = diff_scan(&root, &mut snapshot, DeliverMode::Everything);
                snapshot.save();
                batch
            };
            if !batch.is_empty() {
                (self.handler)(&root, batch);
            }
        }
    }

    /// Flush pending debounces, then release every watch.
    pub fn shutdown(&self) {
        // Letting one debounce window elapse delivers whatever the backend
        // is still holding before the subscriptions drop.
        std::thread::sleep(self.debounce);
        self.lock_roots().clear();
    }

    fn lock_roots(&self) -> std::sync::MutexGuard<'_, HashMap<String, RootWatch>> {
        self.roots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(PartialEq, Clone, Copy)]
enum DeliverMode {
    /// Startup: only entries that differ from the snapshot.
    ChangedOnly,
    /// Reconcile: every on-disk entry, changed or not.
    Everything,
}

/// Walk `root`, update `snapshot`, and build the delivery batch.
fn diff_scan(root: &str, snapshot: &mut Snapshot, mode: DeliverMode) -> Vec<FileChange> {
    let entries = scan::scan_root(root);
    let mut batch = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for entry in &entries {
        seen.insert(entry.name.clone());
        if !entry.readable {
            batch.push(deletion_change(root, &entry.name, snapshot));
            snapshot.remove(&entry.name);
            continue;
        }
        let is_new = !snapshot.contains(&entry.name);
        let changed = is_new || snapshot.get(&entry.name) != Some(&to_snapshot(entry));
        if mode == DeliverMode::Everything || changed {
            batch.push(FileChange {
                watch_root: root.to_string(),
                name: entry.name.clone(),
                kind: entry.kind,
                exists: true,
                is_new,
                mtime_ms: entry.mtime_ms,
                size: entry.size,
            });
        }
        snapshot.insert(entry.name.clone(), to_snapshot(entry));
    }

    // Snapshot entries no longer on disk are deletions.
    for name in snapshot.names() {
        if !seen.contains(&name) {
            batch.push(deletion_change(root, &name, snapshot));
            snapshot.remove(&name);
        }
    }

    batch.sort_by(|a, b| a.name.cmp(&b.name));
    batch
}

/// Build the batch for one debounced set of live event paths.
fn live_batch(root: &str, event_paths: &[PathBuf], snapshot: &mut Snapshot) -> Vec<FileChange> {
    // Coalesce repeated events per path; the map insert makes the last
    // observation win.
    let mut by_name: BTreeMap<String, FileChange> = BTreeMap::new();

    for path in event_paths {
        let path_str = path.to_string_lossy().replace('\\', "/");
        let Some(name) = paths::relative_to(&path_str, root) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        match std::fs::metadata(path) {
            Ok(meta) => {
                let kind = if meta.is_dir() { EntryKind::Dir } else { EntryKind::File };
                let size = if meta.is_dir() { 0 } else { meta.len() };
                let is_new = !snapshot.contains(&name);
                let change = FileChange {
                    watch_root: root.to_string(),
                    name: name.clone(),
                    kind,
                    exists: true,
                    is_new,
                    mtime_ms: scan::mtime_ms(&meta),
                    size,
                };
                snapshot.insert(
                    name.clone(),
                    SnapshotEntry { kind, mtime_ms: change.mtime_ms, size },
                );
                by_name.insert(name, change);
            }
            Err(_) => {
                let change = deletion_change(root, &name, snapshot);
                if change.kind == EntryKind::Dir {
                    // Descendants vanish with their directory; forget them so
                    // a later recreate is seen as new.
                    snapshot.remove_prefix(&name);
                }
                snapshot.remove(&name);
                by_name.insert(name, change);
            }
        }
    }

    by_name.into_values().collect()
}

fn to_snapshot(entry: &ScanEntry) -> SnapshotEntry {
    SnapshotEntry {
        kind: entry.kind,
        mtime_ms: entry.mtime_ms,
        size: entry.size,
    }
}

fn deletion_change(root: &str, name: &str, snapshot: &Snapshot) -> FileChange {
    let kind = snapshot.get(name).map(|e| e.kind).unwrap_or(EntryKind::File);
    FileChange {
        watch_root: root.to_string(),
        name: name.to_string(),
        kind,
        exists: false,
        is_new: false,
        mtime_ms: 0,
        size: 0,
    }
}
