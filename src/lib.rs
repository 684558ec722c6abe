//! Skysync: a background daemon that mirrors local directories to cloud storage.
//!
//! Skysync watches configured directory trees, turns filesystem activity into
//! durable sync jobs in a SQLite store, and executes them against a remote
//! client with retry, pause/resume, and crash-recovery semantics. Sibling CLI
//! invocations control a running daemon through the store's signal queue.

pub mod classifier;
pub mod config;
pub mod coordination;
pub mod daemon;
pub mod events;
pub mod exclude;
pub mod logging;
pub mod output;
pub mod paths;
pub mod processor;
pub mod queue;
pub mod remote;
pub mod retry;
pub mod store;
pub mod watcher;

pub use classifier::ChangeClassifier;
pub use config::{Config, ConfigError, ExcludeEntry, SyncDir};
pub use coordination::{acquire_run_lock, release_run_lock, send_signal, Reply, RunLock};
pub use daemon::{default_state_dir, state_db_path, DaemonOptions};
pub use events::{EventBus, JobEvent, JobEventKind};
pub use exclude::GlobCache;
pub use output::OutputFormat;
pub use processor::{Processor, JOB_POLL_INTERVAL_MS, SHUTDOWN_TIMEOUT_MS};
pub use queue::{FailureOutcome, JobQueue, SYNCED_HIGH_WATERMARK, SYNCED_LOW_WATERMARK};
pub use remote::{DeleteBehavior, RemoteClient, RemoteError, RemoteNode};
pub use retry::{classify_error, ErrorCategory, RetryDecision, RETRY_DELAYS_SEC};
pub use store::jobs::{EventType, JobStatus, SyncJob, STALE_PROCESSING_MS};
pub use store::{Store, StoreError};
pub use watcher::{EntryKind, FileChange, SyncWatcher, WATCHER_DEBOUNCE_MS};
