//! Start command implementation: run the daemon in the foreground.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use skysync::daemon::{self, DaemonOptions};
use skysync::logging;
use skysync::remote::{mirror::MirrorRemote, RemoteClient};

/// Run the daemon until it is stopped (signal row, SIGINT/SIGTERM) or, with
/// `once`, until the startup scan has been drained.
///
/// The remote side is whatever [`RemoteClient`] the deployment links in
/// through the library API; the CLI binary wires the filesystem-backed
/// mirror client, targeting `--mirror-dir` (default `<state_dir>/mirror`).
pub fn run_start(
    config_path: PathBuf,
    state_dir: PathBuf,
    once: bool,
    mirror_dir: Option<PathBuf>,
) -> Result<()> {
    let _log_guard = logging::init(&state_dir)?;

    let target = mirror_dir.unwrap_or_else(|| state_dir.join("mirror"));
    let client: Arc<dyn RemoteClient> = Arc::new(MirrorRemote::new(target));

    daemon::run(
        DaemonOptions {
            config_path,
            state_dir,
            once,
        },
        client,
    )
}
