//! Control commands: signal a running daemon from a sibling process.
//!
//! Each command inserts a signal row; `pause` and `resume` additionally wait
//! for the daemon's reaction (row consumed plus the PAUSED flag in the
//! expected state). A timeout is reported to the user but is not fatal.

use anyhow::Result;
use std::path::PathBuf;

use skysync::coordination::{
    self, pid_alive, Reply, SIGNAL_CONFIG_CHECK, SIGNAL_PAUSE, SIGNAL_RECONCILE, SIGNAL_RESUME,
    SIGNAL_STOP,
};
use skysync::daemon;
use skysync::store::{flags, Store};

pub fn run_stop(state_dir: PathBuf) -> Result<()> {
    let store = open_store(&state_dir)?;
    warn_if_no_daemon(&store)?;
    let id = coordination::send_signal(&store, SIGNAL_STOP)?;
    match coordination::wait_for_reply(&store, id, None)? {
        Reply::Consumed => println!("stop requested"),
        Reply::TimedOut => println!("stop signal queued (no reply from daemon yet)"),
    }
    Ok(())
}

pub fn run_pause(state_dir: PathBuf) -> Result<()> {
    let store = open_store(&state_dir)?;
    warn_if_no_daemon(&store)?;
    let id = coordination::send_signal(&store, SIGNAL_PAUSE)?;
    match coordination::wait_for_reply(&store, id, Some((flags::PAUSED, true)))? {
        Reply::Consumed => println!("sync paused"),
        Reply::TimedOut => println!("pause signal queued (no reply from daemon yet)"),
    }
    Ok(())
}

pub fn run_resume(state_dir: PathBuf) -> Result<()> {
    let store = open_store(&state_dir)?;
    warn_if_no_daemon(&store)?;
    let id = coordination::send_signal(&store, SIGNAL_RESUME)?;
    match coordination::wait_for_reply(&store, id, Some((flags::PAUSED, false)))? {
        Reply::Consumed => println!("sync resumed"),
        Reply::TimedOut => println!("resume signal queued (no reply from daemon yet)"),
    }
    Ok(())
}

pub fn run_reconcile(state_dir: PathBuf) -> Result<()> {
    let store = open_store(&state_dir)?;
    warn_if_no_daemon(&store)?;
    coordination::send_signal(&store, SIGNAL_RECONCILE)?;
    println!("reconcile requested");
    Ok(())
}

pub fn run_config_check(state_dir: PathBuf) -> Result<()> {
    let store = open_store(&state_dir)?;
    warn_if_no_daemon(&store)?;
    coordination::send_signal(&store, SIGNAL_CONFIG_CHECK)?;
    println!("config re-read requested");
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

fn warn_if_no_daemon(store: &Store) -> Result<()> {
    let holder = store.with_conn(flags::running_pid)?;
    let alive = holder
        .as_ref()
        .map(|(_, pid)| *pid > 0 && pid_alive(*pid))
        .unwrap_or(false);
    if !alive {
        eprintln!("warning: no running daemon found; the signal will wait in the queue");
    }
    Ok(())
}
