//! Job processor: bounded-concurrency workers over the claim queue.
//!
//! A poll loop claims due jobs (unless PAUSED) and spawns one worker task
//! per claim, up to the configured concurrency. Workers dispatch to the
//! remote client, record success inside one store transaction, and hand
//! failures to the queue's retry policy. Shutdown waits briefly for
//! in-flight workers; anything still running is abandoned and its claim
//! ages out for the next run to reclaim.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::queue::{FailureOutcome, JobQueue};
use crate::remote::{DeleteBehavior, RemoteClient, RemoteError, RemoteNode};
use crate::store::jobs::{EventType, SyncJob};
use crate::store::{file_state, flags, node_mapping, now_ms, Store, StoreError};

/// How often the poll loop looks for claimable work.
pub const JOB_POLL_INTERVAL_MS: u64 = 2_000;

/// Grace period for in-flight workers at shutdown.
pub const SHUTDOWN_TIMEOUT_MS: u64 = 2_000;

const ACTIVE_POLL: Duration = Duration::from_millis(20);

pub struct Processor {
    store: Arc<Store>,
    queue: Arc<JobQueue>,
    client: Arc<dyn RemoteClient>,
    config: Arc<RwLock<Config>>,
    concurrency: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
}

enum DispatchOutcome {
    Created { node: RemoteNode, is_directory: bool },
    Deleted { existed: bool },
}

impl Processor {
    pub fn new(
        store: Arc<Store>,
        queue: Arc<JobQueue>,
        client: Arc<dyn RemoteClient>,
        config: Arc<RwLock<Config>>,
        concurrency: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            store,
            queue,
            client,
            config,
            concurrency,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of in-flight worker tasks.
    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// The poll loop. Runs until the shutdown signal flips, then gives
    /// in-flight workers [`SHUTDOWN_TIMEOUT_MS`] to finish.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut tick =
            tokio::time::interval(Duration::from_millis(JOB_POLL_INTERVAL_MS));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(err) = self.process_available_jobs() {
                        warn!(%err, "job poll failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        let grace = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
        if tokio::time::timeout(grace, self.wait_for_active_tasks()).await.is_err() {
            warn!(
                active = self.active_tasks(),
                "abandoning in-flight tasks; their claims will age out"
            );
        }
    }

    /// One poll tick: claim and spawn until the pool is full or no job is
    /// eligible. A set PAUSED flag freezes claims entirely. Returns how many
    /// jobs were claimed.
    pub fn process_available_jobs(self: &Arc<Self>) -> Result<usize, StoreError> {
        if self.store.with_conn(|conn| flags::is_set(conn, flags::PAUSED))? {
            return Ok(0);
        }
        let mut claimed = 0;
        while self.active.load(Ordering::SeqCst) < self.concurrency.load(Ordering::SeqCst) {
            let Some(job) = self.queue.claim_next_pending_job()? else {
                break;
            };
            claimed += 1;
            self.active.fetch_add(1, Ordering::SeqCst);
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.run_job(job).await;
                this.active.fetch_sub(1, Ordering::SeqCst);
            });
        }
        Ok(claimed)
    }

    /// Wait until every spawned worker has finished.
    pub async fn wait_for_active_tasks(&self) {
        while self.active.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(ACTIVE_POLL).await;
        }
    }

    /// One-shot mode: keep claiming and processing until the claim returns
    /// nothing and no worker is active.
    pub async fn drain_queue(self: &Arc<Self>) -> Result<(), StoreError> {
        loop {
            let claimed = self.process_available_jobs()?;
            if claimed == 0 && self.active.load(Ordering::SeqCst) == 0 {
                return Ok(());
            }
            tokio::time::sleep(ACTIVE_POLL).await;
        }
    }

    async fn run_job(&self, job: SyncJob) {
        debug!(
            job_id = job.id,
            event = job.event_type.as_str(),
            local = %job.local_path,
            "processing"
        );
        match self.dispatch(&job).await {
            Ok(outcome) => {
                if let Err(err) = self.record_success(&job, outcome) {
                    warn!(job_id = job.id, %err, "recording success failed");
                }
            }
            Err(err) => {
                let message = err.to_string();
                match self.queue.record_failure(&job, &message) {
                    Ok(FailureOutcome::NeedsReupload) => self.reupload(&job).await,
                    Ok(FailureOutcome::Scheduled { category, n_retries }) => {
                        warn!(
                            job_id = job.id,
                            category = category.as_str(),
                            n_retries,
                            error = %message,
                            "job failed; retry scheduled"
                        );
                    }
                    Ok(FailureOutcome::Blocked { category }) => {
                        warn!(
                            job_id = job.id,
                            category = category.as_str(),
                            error = %message,
                            "job blocked"
                        );
                    }
                    Err(err) => warn!(job_id = job.id, %err, "recording failure failed"),
                }
            }
        }
    }

    async fn dispatch(&self, job: &SyncJob) -> Result<DispatchOutcome, RemoteError> {
        match job.event_type {
            EventType::CreateFile | EventType::Update => {
                let local = Path::new(&job.local_path);
                if !local.exists() {
                    return Err(RemoteError::Api(format!(
                        "no such file or directory: {}",
                        job.local_path
                    )));
                }
                let node = self.client.upload_file(local, &job.remote_path).await?;
                Ok(DispatchOutcome::Created { node, is_directory: false })
            }
            EventType::CreateDir => {
                let node = self.client.create_folder(&job.remote_path).await?;
                Ok(DispatchOutcome::Created { node, is_directory: true })
            }
            EventType::Delete => {
                let permanent = self.delete_behavior() == DeleteBehavior::Permanent;
                let existed = self.client.delete(&job.remote_path, permanent).await?;
                Ok(DispatchOutcome::Deleted { existed })
            }
        }
    }

    fn record_success(&self, job: &SyncJob, outcome: DispatchOutcome) -> Result<(), StoreError> {
        match outcome {
            DispatchOutcome::Created { node, is_directory } => {
                self.queue.mark_synced_with(job, |tx| {
                    let now = now_ms();
                    if let Some(token) = &job.change_token {
                        file_state::upsert(tx, &job.local_path, token, now)?;
                    }
                    node_mapping::upsert(
                        tx,
                        &job.local_path,
                        &job.remote_path,
                        &node.node_uid,
                        &node.parent_node_uid,
                        is_directory,
                        now,
                    )
                })?;
                info!(local = %job.local_path, remote = %job.remote_path, "synced");
            }
            DispatchOutcome::Deleted { existed } => {
                // FileState and NodeMapping were cleared at classification.
                self.queue.mark_synced(job)?;
                info!(remote = %job.remote_path, existed, "deleted");
            }
        }
        Ok(())
    }

    /// Reupload fallback: trash the remote node, then recreate it. Success
    /// marks the job SYNCED; failure reschedules another fixed-delay retry.
    async fn reupload(&self, job: &SyncJob) {
        info!(remote = %job.remote_path, "reupload: delete then recreate");
        let attempt: Result<DispatchOutcome, RemoteError> = async {
            self.client.delete(&job.remote_path, false).await?;
            match job.event_type {
                EventType::CreateDir => {
                    let node = self.client.create_folder(&job.remote_path).await?;
                    Ok(DispatchOutcome::Created { node, is_directory: true })
                }
                _ => {
                    let local = Path::new(&job.local_path);
                    if !local.exists() {
                        return Err(RemoteError::Api(format!(
                            "no such file or directory: {}",
                            job.local_path
                        )));
                    }
                    let node = self.client.upload_file(local, &job.remote_path).await?;
                    Ok(DispatchOutcome::Created { node, is_directory: false })
                }
            }
        }
        .await;

        match attempt {
            Ok(outcome) => {
                if let Err(err) = self.record_success(job, outcome) {
                    warn!(job_id = job.id, %err, "recording reupload success failed");
                }
            }
            Err(err) => {
                let message = err.to_string();
                warn!(job_id = job.id, error = %message, "reupload failed; rescheduled");
                if let Err(err) = self.queue.reschedule_reupload(job, &message) {
                    warn!(job_id = job.id, %err, "rescheduling reupload failed");
                }
            }
        }
    }

    fn delete_behavior(&self) -> DeleteBehavior {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remote_delete_behavior
    }
}
