//! Jobs listing and failed-job reset commands.

use anyhow::Result;
use std::path::PathBuf;

use skysync::coordination::{self, SIGNAL_RECONCILE};
use skysync::daemon;
use skysync::output::{print_serialized, OutputFormat};
use skysync::retry::classify_error;
use skysync::store::jobs::{self, JobStatus};
use skysync::store::Store;

/// Run jobs listing command
///
/// Usage: skysync jobs [--status <STATUS> | --all] [--limit <N>]
pub fn run_jobs(
    state_dir: PathBuf,
    status: Option<JobStatus>,
    limit: i64,
    output_format: OutputFormat,
) -> Result<()> {
    let store = open_store(&state_dir)?;
    let rows = store.with_conn(|conn| jobs::list(conn, status, limit))?;

    match output_format {
        OutputFormat::Json | OutputFormat::Pretty => print_serialized(&rows, output_format)?,
        OutputFormat::Human => {
            if rows.is_empty() {
                println!("no jobs");
                return Ok(());
            }
            for job in rows {
                let mut line = format!(
                    "#{} {} {} {} -> {}",
                    job.id,
                    job.status.as_str(),
                    job.event_type.as_str(),
                    job.local_path,
                    job.remote_path
                );
                if job.n_retries > 0 {
                    line.push_str(&format!(" (retries: {})", job.n_retries));
                }
                if let Some(error) = &job.last_error {
                    line.push_str(&format!(
                        " [{}] {}",
                        classify_error(error).as_str(),
                        error
                    ));
                }
                println!("{line}");
            }
        }
    }
    Ok(())
}

/// Clear every BLOCKED job and queue a reconcile so surviving local state is
/// re-observed and re-enqueued.
pub fn run_reset_failed(state_dir: PathBuf) -> Result<()> {
    let store = open_store(&state_dir)?;
    let removed = store.with_conn(jobs::delete_blocked)?;
    coordination::send_signal(&store, SIGNAL_RECONCILE)?;
    println!("cleared {} failed job(s); reconcile requested", removed);
    Ok(())
}

fn open_store(state_dir: &PathBuf) -> Result<Store> {
    let db_path = daemon::state_db_path(state_dir);
    if !db_path.exists() {
        return Err(anyhow::anyhow!(
            "no state database at {} (has the daemon ever run?)",
            db_path.display()
        ));
    }
    Ok(Store::open(&db_path)?)
}
