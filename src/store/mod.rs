//! Durable store for all daemon state.
//!
//! A single SQLite database holds jobs, processing claims, file-state tokens,
//! node mappings, flags, and the signal queue. The daemon and sibling CLI
//! processes all open the same file; WAL mode plus a 5-second busy timeout
//! let concurrent writers wait instead of failing. In-process writers are
//! additionally serialized behind a mutex so multi-table operations commit as
//! one transaction.
//!
//! Row-level helpers live in the submodules as free functions over
//! `&rusqlite::Connection`, so a single transaction can span tables.

pub mod file_state;
pub mod flags;
pub mod jobs;
pub mod migrations;
pub mod node_mapping;
pub mod signals;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Writer busy-wait deadline before a contended write surfaces as an error.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Store-level error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database is busy")]
    Busy,

    #[error("migration {version} was applied with a different content hash")]
    MigrationHashMismatch { version: i64 },

    #[error("cannot create state directory {0}")]
    StateDir(PathBuf, #[source] std::io::Error),

    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StoreError::Busy
            }
            _ => StoreError::Sqlite(err),
        }
    }
}

/// Wall-clock milliseconds, the timestamp unit for every table.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Handle to the state database.
///
/// Cloneable via `Arc`; `Send + Sync` because the connection sits behind a
/// mutex. Opening runs all pending migrations.
pub struct Store {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Store {
    /// Open (or create) the store at `path` and bring the schema current.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::StateDir(parent.to_path_buf(), e))?;
        }
        let mut conn = Connection::open(path)?;
        Self::configure(&conn)?;
        migrations::apply_all(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        Self::configure(&conn)?;
        migrations::apply_all(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    fn configure(conn: &Connection) -> Result<(), StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL for crash-safe commits with concurrent readers. An in-memory
        // database reports "memory" here; both answers are fine.
        let _mode: String =
            conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous=NORMAL")?;
        Ok(())
    }

    /// Database file path (`:memory:` for test stores).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the connection without an explicit transaction.
    ///
    /// Single-statement reads and writes take this path; SQLite gives each
    /// statement its own implicit transaction.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = self.lock();
        Ok(f(&conn)?)
    }

    /// Run `f` inside one IMMEDIATE transaction.
    ///
    /// Every multi-row state change goes through here so partially-applied
    /// updates are never visible to concurrent watchers, processors, or
    /// sibling CLI writers.
    pub fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex only means another thread panicked mid-operation;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
