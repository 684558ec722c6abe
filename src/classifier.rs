//! Change classifier: filesystem observations in, durable jobs out.
//!
//! Per event it resolves the owning sync-dir, derives the local and remote
//! paths, drops excluded paths, and applies the decision table: deletions
//! enqueue DELETE and cascade state cleanup, directory metadata churn is a
//! no-op, and file events are suppressed whenever the stored change token
//! already matches. Everything a single event touches commits as one store
//! transaction; the enqueue event is emitted after commit.

use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::config::Config;
use crate::events::{EventBus, JobEvent, JobEventKind};
use crate::exclude::{self, GlobCache};
use crate::paths;
use crate::store::jobs::EventType;
use crate::store::{file_state, jobs, node_mapping, now_ms, Store, StoreError};
use crate::watcher::{EntryKind, FileChange};

pub struct ChangeClassifier {
    store: Arc<Store>,
    events: EventBus,
    config: Arc<RwLock<Config>>,
    globs: Arc<GlobCache>,
}

impl ChangeClassifier {
    pub fn new(
        store: Arc<Store>,
        events: EventBus,
        config: Arc<RwLock<Config>>,
        globs: Arc<GlobCache>,
    ) -> Self {
        Self { store, events, config, globs }
    }

    /// Classify every change in a batch. Entry-level failures are logged and
    /// skipped; the batch itself never fails (the watcher will observe the
    /// path again on the next reconcile).
    pub fn handle_batch(&self, watch_root: &str, changes: &[FileChange]) {
        for change in changes {
            if let Err(err) = self.handle_change(change) {
                warn!(
                    root = watch_root,
                    name = %change.name,
                    %err,
                    "classification failed; entry skipped"
                );
            }
        }
    }

    /// Classify one change. Returns the enqueued `(job_id, event_type)`, or
    /// `None` when the event was a no-op.
    pub fn handle_change(
        &self,
        change: &FileChange,
    ) -> Result<Option<(i64, EventType)>, StoreError> {
        let (sync_dir, excludes) = {
            let config = self
                .config
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let Some(dir) = config.sync_dir_for_root(&change.watch_root) else {
                debug!(root = %change.watch_root, "no sync-dir for watch root");
                return Ok(None);
            };
            (dir.clone(), config.exclude_patterns.clone())
        };

        let local_path = paths::join_local(&sync_dir.source_path, &change.name);
        let remote_path = paths::join_remote(&sync_dir.remote_root, &change.name);

        if exclude::is_excluded(&self.globs, &excludes, &sync_dir.source_path, &local_path) {
            return Ok(None);
        }

        let token = paths::change_token(change.mtime_ms, change.size);
        let enqueued = self.store.with_tx(|tx| {
            let now = now_ms();
            if !change.exists {
                let id = jobs::upsert_pending(
                    tx,
                    EventType::Delete,
                    &local_path,
                    &remote_path,
                    None,
                    now,
                )?;
                file_state::delete(tx, &local_path)?;
                node_mapping::delete(tx, &local_path, &remote_path)?;
                if change.kind == EntryKind::Dir {
                    file_state::delete_prefix(tx, &local_path)?;
                    node_mapping::delete_prefix_pair(tx, &local_path, &remote_path)?;
                }
                return Ok(Some((id, EventType::Delete)));
            }

            match change.kind {
                EntryKind::Dir => {
                    if !change.is_new {
                        // Directory metadata changes produce no work.
                        return Ok(None);
                    }
                    if node_mapping::get(tx, &local_path, &remote_path)?.is_some() {
                        return Ok(None);
                    }
                    let id = jobs::upsert_pending(
                        tx,
                        EventType::CreateDir,
                        &local_path,
                        &remote_path,
                        Some(&token),
                        now,
                    )?;
                    Ok(Some((id, EventType::CreateDir)))
                }
                EntryKind::File => {
                    if file_state::get_token(tx, &local_path)?.as_deref() == Some(token.as_str()) {
                        return Ok(None);
                    }
                    let event_type = if change.is_new {
                        EventType::CreateFile
                    } else {
                        EventType::Update
                    };
                    let id = jobs::upsert_pending(
                        tx,
                        event_type,
                        &local_path,
                        &remote_path,
                        Some(&token),
                        now,
                    )?;
                    Ok(Some((id, event_type)))
                }
            }
        })?;

        if let Some((job_id, _)) = enqueued {
            self.events.emit(JobEvent::new(
                JobEventKind::Enqueue,
                job_id,
                &local_path,
                &remote_path,
            ));
        }
        Ok(enqueued)
    }
}
