//! Status command implementation for Skysync
//!
//! Reads daemon and queue state straight from the store; works whether or
//! not a daemon is currently running.

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use skysync::coordination::pid_alive;
use skysync::daemon;
use skysync::output::{print_serialized, OutputFormat};
use skysync::store::jobs::JobCounts;
use skysync::store::{file_state, flags, jobs, node_mapping, signals, Store};

#[derive(Debug, Serialize)]
struct StatusResponse {
    running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<i32>,
    paused: bool,
    jobs: JobCounts,
    pending_signals: usize,
    tracked_files: i64,
    node_mappings: i64,
}

/// Run status query command
///
/// Usage: skysync status [--state-dir <DIR>] [--output <FORMAT>]
pub fn run_status(state_dir: PathBuf, output_format: OutputFormat) -> Result<()> {
    let db_path = daemon::state_db_path(&state_dir);
    if !db_path.exists() {
        return Err(anyhow::anyhow!(
            "no state database at {} (has the daemon ever run?)",
            db_path.display()
        ));
    }
    let store = Store::open(&db_path)?;

    let (counts, paused, holder, pending_signals, tracked_files, node_mappings) =
        store.with_conn(|conn| {
            Ok((
                jobs::counts(conn)?,
                flags::is_set(conn, flags::PAUSED)?,
                flags::running_pid(conn)?,
                signals::list(conn)?.len(),
                file_state::count(conn)?,
                node_mapping::count(conn)?,
            ))
        })?;

    let pid = holder.map(|(_, pid)| pid);
    let running = pid.map(|pid| pid > 0 && pid_alive(pid)).unwrap_or(false);

    match output_format {
        OutputFormat::Json | OutputFormat::Pretty => {
            let response = StatusResponse {
                running,
                pid,
                paused,
                jobs: counts,
                pending_signals,
                tracked_files,
                node_mappings,
            };
            print_serialized(&response, output_format)?;
        }
        OutputFormat::Human => {
            match (running, pid) {
                (true, Some(pid)) => println!("daemon: running (pid {})", pid),
                (false, Some(pid)) => println!("daemon: not running (stale pid {})", pid),
                _ => println!("daemon: not running"),
            }
            println!("paused: {}", paused);
            println!("pending: {}", counts.pending);
            println!("processing: {}", counts.processing);
            println!("synced: {}", counts.synced);
            println!("failed: {}", counts.blocked);
            println!("pending_signals: {}", pending_signals);
            println!("tracked_files: {}", tracked_files);
            println!("node_mappings: {}", node_mappings);
        }
    }
    Ok(())
}
