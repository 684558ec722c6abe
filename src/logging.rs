//! Logging initialization.
//!
//! Two sinks: a compact human layer on stderr and a line-oriented JSON layer
//! appended to `<state_dir>/sync.log` through a non-blocking writer. The
//! filter honors `RUST_LOG` and defaults to `info`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. The returned guard must stay alive for the
/// process lifetime or buffered log lines are lost.
pub fn init(state_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("cannot create state dir {}", state_dir.display()))?;

    let appender = tracing_appender::rolling::never(state_dir, "sync.log");
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer),
        )
        .try_init()
        .map_err(|err| anyhow::anyhow!("logging already initialized: {err}"))?;

    Ok(guard)
}
