//! Durable job queue: claim semantics, terminal transitions, retry
//! scheduling, event emission.
//!
//! The queue is a thin policy layer over the store's job tables. Claiming
//! and completing both run as single transactions, and every terminal update
//! is gated on the row still being PROCESSING so a superseding enqueue (which
//! resets the row to PENDING) is never overwritten — the newer intent is
//! re-claimed on the next poll.

use rusqlite::Transaction;
use std::sync::Arc;

use crate::events::{EventBus, JobEvent, JobEventKind};
use crate::retry::{self, ErrorCategory, RetryDecision};
use crate::store::jobs::{self, SyncJob};
use crate::store::{now_ms, Store, StoreError};

/// SYNCED rows above this trigger a prune...
pub const SYNCED_HIGH_WATERMARK: i64 = 1280;
/// ...down to this many.
pub const SYNCED_LOW_WATERMARK: i64 = 1024;

/// How the queue disposed of a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Rescheduled; the job is PENDING again with a future `retry_at`.
    Scheduled { category: ErrorCategory, n_retries: i64 },
    /// Terminal; surfaced to the operator.
    Blocked { category: ErrorCategory },
    /// Reupload attempts exhausted; the worker should delete the remote
    /// node and recreate it while still holding the claim.
    NeedsReupload,
}

pub struct JobQueue {
    store: Arc<Store>,
    events: EventBus,
}

impl JobQueue {
    pub fn new(store: Arc<Store>, events: EventBus) -> Self {
        Self { store, events }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Claim the next eligible job, reaping stale claims first. One
    /// transaction; at most one PROCESSING job per `local_path` afterwards.
    pub fn claim_next_pending_job(&self) -> Result<Option<SyncJob>, StoreError> {
        self.store.with_tx(|tx| jobs::claim_next(tx, now_ms()))
    }

    /// Mark a claimed job SYNCED.
    pub fn mark_synced(&self, job: &SyncJob) -> Result<bool, StoreError> {
        self.mark_synced_with(job, |_| Ok(()))
    }

    /// Mark a claimed job SYNCED, running `mutate` inside the same
    /// transaction first (file-state and node-mapping writes on upload
    /// success). The SYNCED backlog is pruned in the same transaction.
    pub fn mark_synced_with(
        &self,
        job: &SyncJob,
        mutate: impl FnOnce(&Transaction) -> rusqlite::Result<()>,
    ) -> Result<bool, StoreError> {
        let updated = self.store.with_tx(|tx| {
            mutate(tx)?;
            let updated = jobs::mark_synced(tx, job.id, &job.local_path)?;
            jobs::prune_synced(tx, SYNCED_HIGH_WATERMARK, SYNCED_LOW_WATERMARK)?;
            Ok(updated)
        })?;
        if updated {
            self.events.emit(JobEvent::new(
                JobEventKind::Synced,
                job.id,
                &job.local_path,
                &job.remote_path,
            ));
        }
        Ok(updated)
    }

    /// Mark a claimed job BLOCKED with its final error.
    pub fn mark_blocked(&self, job: &SyncJob, error: &str) -> Result<bool, StoreError> {
        let updated = self
            .store
            .with_tx(|tx| jobs::mark_blocked(tx, job.id, &job.local_path, error))?;
        if updated {
            self.events.emit(
                JobEvent::new(JobEventKind::Blocked, job.id, &job.local_path, &job.remote_path)
                    .with_error(error),
            );
        }
        Ok(updated)
    }

    /// Classify a failure and apply the retry policy.
    pub fn record_failure(
        &self,
        job: &SyncJob,
        error: &str,
    ) -> Result<FailureOutcome, StoreError> {
        let category = retry::classify_error(error);
        match retry::decide(category, job.n_retries) {
            RetryDecision::Retry { delay, n_retries } => {
                self.reschedule(job, error, delay, n_retries)?;
                Ok(FailureOutcome::Scheduled { category, n_retries })
            }
            RetryDecision::Block => {
                self.mark_blocked(job, error)?;
                Ok(FailureOutcome::Blocked { category })
            }
            RetryDecision::Reupload => Ok(FailureOutcome::NeedsReupload),
        }
    }

    /// Reschedule a claimed job without reclassifying (reupload recreate
    /// failed; try the fixed-delay path again).
    pub fn reschedule_reupload(&self, job: &SyncJob, error: &str) -> Result<bool, StoreError> {
        self.reschedule(job, error, retry::reupload_delay(), job.n_retries)
    }

    fn reschedule(
        &self,
        job: &SyncJob,
        error: &str,
        delay: std::time::Duration,
        n_retries: i64,
    ) -> Result<bool, StoreError> {
        let retry_at = now_ms() + delay.as_millis() as i64;
        let updated = self.store.with_tx(|tx| {
            jobs::schedule_retry(tx, job.id, &job.local_path, retry_at, n_retries, error)
        })?;
        if updated {
            self.events.emit(
                JobEvent::new(JobEventKind::Retry, job.id, &job.local_path, &job.remote_path)
                    .with_error(error),
            );
        }
        Ok(updated)
    }
}
