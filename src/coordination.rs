//! Multi-process coordination: run-lock, signal queue, reply waiting.
//!
//! All coordination flows through the store's `flags` and `signals` tables;
//! there is no socket or pipe IPC. The run-lock is a `running_pid:<N>` flag
//! held by the live daemon; acquisition garbage-collects a dead holder's
//! flag and its stale signals in the same transaction that installs the new
//! pid. Signal names are a stable wire contract between the daemon and
//! sibling CLI invocations.

use std::time::{Duration, Instant};
use tracing::info;

use crate::store::{flags, now_ms, signals, Store, StoreError};

/// How often the daemon drains the signal table.
pub const SIGNAL_POLL_INTERVAL_MS: u64 = 1_000;

/// How long a producer waits for the daemon to react.
pub const REPLY_TIMEOUT_MS: u64 = 5_000;

pub const SIGNAL_STOP: &str = "stop";
pub const SIGNAL_PAUSE: &str = "pause-sync";
pub const SIGNAL_RESUME: &str = "resume-sync";
pub const SIGNAL_RECONCILE: &str = "reconcile";
pub const SIGNAL_CONFIG_CHECK: &str = "config:check";
pub const SIGNAL_CONFIG_RELOAD_PREFIX: &str = "config:reload:";

/// Outcome of a run-lock acquisition attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum RunLock {
    /// Lock installed for `pid`.
    Acquired { pid: i32 },
    /// A live daemon already holds it.
    Held { pid: i32 },
}

/// Try to become the single running daemon.
///
/// One transaction: read the `running_pid:*` flag; refuse if its holder is
/// alive; otherwise reap the stale flag plus every queued signal (they were
/// addressed to a dead process) and install our own pid.
pub fn acquire_run_lock(store: &Store, pid: i32) -> Result<RunLock, StoreError> {
    store.with_tx(|tx| {
        if let Some((flag, holder)) = flags::running_pid(tx)? {
            if holder > 0 && pid_alive(holder) {
                return Ok(RunLock::Held { pid: holder });
            }
            flags::clear(tx, &flag)?;
            let stale = signals::clear_all(tx)?;
            if stale > 0 {
                info!(holder, stale, "reaped dead daemon's lock and stale signals");
            }
        }
        flags::set(tx, &format!("{}{}", flags::RUNNING_PID_PREFIX, pid), now_ms())?;
        Ok(RunLock::Acquired { pid })
    })
}

/// Graceful-shutdown cleanup: drop our pid flag and any lingering PAUSED.
pub fn release_run_lock(store: &Store, pid: i32) -> Result<(), StoreError> {
    store.with_tx(|tx| {
        flags::clear(tx, &format!("{}{}", flags::RUNNING_PID_PREFIX, pid))?;
        flags::clear(tx, flags::PAUSED)?;
        Ok(())
    })
}

/// Whether the OS reports `pid` as alive.
#[cfg(unix)]
pub fn pid_alive(pid: i32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: i32) -> bool {
    // No cheap liveness probe; err on the side of an existing daemon.
    true
}

/// Insert a signal row for the running daemon. Returns the row id.
pub fn send_signal(store: &Store, name: &str) -> Result<i64, StoreError> {
    store.with_conn(|conn| signals::send(conn, name, now_ms()))
}

/// What a producer observed while waiting for a reply.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    /// The daemon consumed the signal row (and the expected flag state, if
    /// any, was observed).
    Consumed,
    /// Nothing happened within the timeout; reported, not fatal.
    TimedOut,
}

/// Poll until the daemon reacts — the signal row disappears or, when `flag`
/// is given, the named flag reaches the wanted state — or until the reply
/// timeout expires.
pub fn wait_for_reply(
    store: &Store,
    signal_id: i64,
    flag: Option<(&str, bool)>,
) -> Result<Reply, StoreError> {
    let deadline = Instant::now() + Duration::from_millis(REPLY_TIMEOUT_MS);
    loop {
        let consumed = !store.with_conn(|conn| signals::exists(conn, signal_id))?;
        let flag_observed = match flag {
            None => false,
            Some((name, want)) => {
                store.with_conn(|conn| flags::is_set(conn, name))? == want
            }
        };
        if consumed || flag_observed {
            return Ok(Reply::Consumed);
        }
        if Instant::now() >= deadline {
            return Ok(Reply::TimedOut);
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}
