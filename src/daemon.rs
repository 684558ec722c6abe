//! Daemon engine: wiring, polling loops, config reload, graceful shutdown.
//!
//! Ownership layout follows the process-wide-state rule: the glob cache, the
//! shared config, the event bus, and the concurrency knob are all owned here
//! and passed to components by reference. The two polling loops (signals,
//! processor) are independent tasks cancelled through one shutdown channel
//! shared with the workers.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::classifier::ChangeClassifier;
use crate::config::{self, Config};
use crate::coordination::{
    self, RunLock, SIGNAL_CONFIG_CHECK, SIGNAL_CONFIG_RELOAD_PREFIX, SIGNAL_PAUSE,
    SIGNAL_RECONCILE, SIGNAL_RESUME, SIGNAL_STOP, SIGNAL_POLL_INTERVAL_MS,
};
use crate::events::EventBus;
use crate::exclude::GlobCache;
use crate::processor::Processor;
use crate::queue::JobQueue;
use crate::remote::RemoteClient;
use crate::store::{file_state, flags, node_mapping, signals, Store};
use crate::watcher::SyncWatcher;

pub struct DaemonOptions {
    pub config_path: PathBuf,
    pub state_dir: PathBuf,
    /// Scan, drain the queue, exit.
    pub once: bool,
}

/// Default state directory: `~/.local/share/skysync` (platform equivalent).
pub fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .map(|base| base.join("skysync"))
        .unwrap_or_else(|| PathBuf::from(".skysync"))
}

pub fn state_db_path(state_dir: &Path) -> PathBuf {
    state_dir.join("state.db")
}

/// Run the daemon to completion (stop signal, SIGINT/SIGTERM, or --once
/// drain). Fatal errors: unreadable config, unusable store, watcher startup
/// failure, or a live daemon already holding the run-lock.
pub fn run(opts: DaemonOptions, client: Arc<dyn RemoteClient>) -> Result<()> {
    let config = Config::load(&opts.config_path).context("invalid configuration")?;
    let store = Arc::new(
        Store::open(&state_db_path(&opts.state_dir)).context("cannot open state database")?,
    );

    let pid = std::process::id() as i32;
    match coordination::acquire_run_lock(&store, pid)? {
        RunLock::Held { pid } => bail!("daemon already running (pid {pid})"),
        RunLock::Acquired { .. } => {}
    }
    info!(pid, state_dir = %opts.state_dir.display(), "daemon starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start async runtime")?;
    let result = runtime.block_on(engine(&opts, config, store.clone(), client));
    // Dropping the runtime cancels abandoned worker tasks; their claims age
    // out and are reclaimed on the next run.
    drop(runtime);

    if let Err(err) = coordination::release_run_lock(&store, pid) {
        warn!(%err, "releasing run lock failed");
    }
    info!("daemon stopped");
    result
}

async fn engine(
    opts: &DaemonOptions,
    config: Config,
    store: Arc<Store>,
    client: Arc<dyn RemoteClient>,
) -> Result<()> {
    let events = EventBus::new();
    let globs = Arc::new(GlobCache::new());
    let concurrency = Arc::new(AtomicUsize::new(config.sync_concurrency));
    let shared_config = Arc::new(RwLock::new(config));

    let classifier = Arc::new(ChangeClassifier::new(
        store.clone(),
        events.clone(),
        shared_config.clone(),
        globs.clone(),
    ));
    let watcher = {
        let classifier = classifier.clone();
        Arc::new(SyncWatcher::new(
            opts.state_dir.clone(),
            Arc::new(move |root: &str, batch| classifier.handle_batch(root, &batch)),
        ))
    };

    // Startup scans are delivered synchronously by add_root; a watcher that
    // cannot start is fatal.
    let roots = shared_config
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .source_roots();
    for root in &roots {
        watcher.add_root(root)?;
    }

    let queue = Arc::new(JobQueue::new(store.clone(), events.clone()));
    let processor = Arc::new(Processor::new(
        store.clone(),
        queue,
        client,
        shared_config.clone(),
        concurrency.clone(),
    ));

    if opts.once {
        processor.drain_queue().await?;
        watcher.shutdown();
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let processor_handle = tokio::spawn(processor.clone().run(shutdown_rx));

    // OS signals fold into the same shutdown path as the `stop` signal row.
    let terminated = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    {
        signal_hook::flag::register(signal_hook::consts::SIGTERM, terminated.clone())
            .context("cannot register SIGTERM handler")?;
        signal_hook::flag::register(signal_hook::consts::SIGINT, terminated.clone())
            .context("cannot register SIGINT handler")?;
    }

    let daemon = Daemon {
        store,
        config_path: opts.config_path.clone(),
        config: shared_config,
        concurrency,
        globs,
        watcher: watcher.clone(),
    };

    let mut tick = tokio::time::interval(Duration::from_millis(SIGNAL_POLL_INTERVAL_MS));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        if terminated.load(Ordering::SeqCst) {
            info!("termination signal received");
            break;
        }
        match daemon.poll_signals() {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => break,
            Err(err) => warn!(%err, "signal poll failed"),
        }
    }

    let _ = shutdown_tx.send(true);
    watcher.shutdown();
    if let Err(err) = processor_handle.await {
        error!(%err, "processor task panicked");
    }
    Ok(())
}

enum Flow {
    Continue,
    Stop,
}

struct Daemon {
    store: Arc<Store>,
    config_path: PathBuf,
    config: Arc<RwLock<Config>>,
    concurrency: Arc<AtomicUsize>,
    globs: Arc<GlobCache>,
    watcher: Arc<SyncWatcher>,
}

impl Daemon {
    /// Drain the signal table. Each recognized row is deleted first, then
    /// acted on, so a handler that never returns cannot strand the row.
    /// Unknown names stay queued.
    fn poll_signals(&self) -> Result<Flow> {
        let rows = self.store.with_conn(signals::list)?;
        for row in rows {
            if !recognized(&row.name) {
                continue;
            }
            let consumed = self.store.with_conn(|conn| signals::consume(conn, row.id))?;
            if !consumed {
                continue;
            }
            info!(signal = %row.name, "signal received");
            if let Flow::Stop = self.dispatch(&row.name)? {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    fn dispatch(&self, name: &str) -> Result<Flow> {
        match name {
            SIGNAL_STOP => return Ok(Flow::Stop),
            SIGNAL_PAUSE => {
                self.store
                    .with_conn(|conn| flags::set(conn, flags::PAUSED, crate::store::now_ms()))?;
                info!("sync paused");
            }
            SIGNAL_RESUME => {
                self.store.with_conn(|conn| flags::clear(conn, flags::PAUSED))?;
                info!("sync resumed");
            }
            SIGNAL_RECONCILE => self.spawn_reconcile(),
            SIGNAL_CONFIG_CHECK => self.reload_config(),
            key if key.starts_with(SIGNAL_CONFIG_RELOAD_PREFIX) => {
                self.apply_reload(&key[SIGNAL_CONFIG_RELOAD_PREFIX.len()..]);
            }
            _ => {}
        }
        Ok(Flow::Continue)
    }

    fn spawn_reconcile(&self) {
        let watcher = self.watcher.clone();
        tokio::task::spawn_blocking(move || watcher.reconcile());
    }

    /// Re-read the config file; keep the old config when the new one is
    /// invalid. Each changed key dispatches its reload handler.
    fn reload_config(&self) {
        let new = match Config::load(&self.config_path) {
            Ok(new) => new,
            Err(err) => {
                warn!(%err, "config reload rejected; keeping previous config");
                return;
            }
        };
        let changed = {
            let mut current = self
                .config
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let changed = config::diff_keys(&current, &new);
            *current = new;
            changed
        };
        for key in changed {
            info!(key, "config changed");
            self.apply_reload(key);
        }
    }

    fn apply_reload(&self, key: &str) {
        match key {
            "sync_concurrency" => {
                let n = self.read_config().sync_concurrency;
                self.concurrency.store(n, Ordering::SeqCst);
                info!(concurrency = n, "worker pool resized");
            }
            "sync_dirs" => self.reload_sync_dirs(),
            "exclude_patterns" => self.globs.invalidate(),
            "dashboard_host" | "dashboard_port" => {
                let config = self.read_config();
                info!(
                    host = %config.dashboard_host,
                    port = config.dashboard_port,
                    "dashboard endpoint changed; dashboard must rebind"
                );
            }
            _ => {}
        }
    }

    /// Sync-dir membership changed: drop watches that no longer apply,
    /// remove orphaned state, subscribe the new set, then reconcile.
    fn reload_sync_dirs(&self) {
        let roots = self.read_config().source_roots();

        for watched in self.watcher.roots() {
            if !roots.contains(&watched) {
                self.watcher.remove_root(&watched);
            }
        }

        let orphans = self.store.with_tx(|tx| {
            let files = file_state::delete_outside_roots(tx, &roots)?;
            let mappings = node_mapping::delete_outside_roots(tx, &roots)?;
            Ok(files + mappings)
        });
        match orphans {
            Ok(n) if n > 0 => info!(rows = n, "orphan cleanup"),
            Ok(_) => {}
            Err(err) => warn!(%err, "orphan cleanup failed"),
        }

        let watched = self.watcher.roots();
        for root in &roots {
            if !watched.contains(root) {
                if let Err(err) = self.watcher.add_root(root) {
                    warn!(root = %root, %err, "cannot watch new sync dir");
                }
            }
        }
        self.spawn_reconcile();
    }

    fn read_config(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn recognized(name: &str) -> bool {
    matches!(
        name,
        SIGNAL_STOP | SIGNAL_PAUSE | SIGNAL_RESUME | SIGNAL_RECONCILE | SIGNAL_CONFIG_CHECK
    ) || name.starts_with(SIGNAL_CONFIG_RELOAD_PREFIX)
}
