//! Ordered schema migrations with content-hash bookkeeping.
//!
//! Each migration is applied at most once, inside its own transaction, and
//! leaves a sha256 hash of its SQL in `schema_migrations`. Re-running against
//! a database whose recorded hash differs from the compiled-in SQL is a hard
//! error rather than a silent re-apply.

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use super::{now_ms, StoreError};

/// One schema step. SQL may contain multiple statements.
pub struct Migration {
    pub version: i64,
    pub sql: &'static str,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: "\
CREATE TABLE sync_jobs (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type   TEXT NOT NULL CHECK(event_type IN
                   ('CREATE_FILE','CREATE_DIR','UPDATE','DELETE')),
    local_path   TEXT NOT NULL,
    remote_path  TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'PENDING' CHECK(status IN
                   ('PENDING','PROCESSING','SYNCED','BLOCKED')),
    retry_at     INTEGER NOT NULL,
    n_retries    INTEGER NOT NULL DEFAULT 0,
    last_error   TEXT,
    change_token TEXT,
    created_at   INTEGER NOT NULL,
    UNIQUE(local_path, remote_path)
);
CREATE INDEX idx_sync_jobs_claim ON sync_jobs(status, retry_at);
CREATE TABLE processing_queue (
    local_path TEXT PRIMARY KEY,
    started_at INTEGER NOT NULL
);
CREATE TABLE file_state (
    local_path   TEXT PRIMARY KEY,
    change_token TEXT NOT NULL,
    updated_at   INTEGER NOT NULL
);
CREATE TABLE node_mapping (
    local_path      TEXT NOT NULL,
    remote_path     TEXT NOT NULL,
    node_uid        TEXT NOT NULL,
    parent_node_uid TEXT NOT NULL,
    is_directory    INTEGER NOT NULL DEFAULT 0,
    updated_at      INTEGER NOT NULL,
    PRIMARY KEY (local_path, remote_path)
);
",
    },
    Migration {
        version: 2,
        sql: "\
CREATE TABLE flags (
    name       TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL
);
CREATE TABLE signals (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
",
    },
];

/// Stable content hash of a migration's SQL (first 16 hex chars of sha256).
pub fn content_hash(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Apply every pending migration; verify hashes of already-applied ones.
pub fn apply_all(conn: &mut Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version      INTEGER PRIMARY KEY,
            content_hash TEXT NOT NULL,
            applied_at   INTEGER NOT NULL
        )",
    )?;

    for migration in MIGRATIONS {
        let hash = content_hash(migration.sql);
        let recorded: Option<String> = conn
            .query_row(
                "SELECT content_hash FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;

        match recorded {
            Some(existing) if existing == hash => continue,
            Some(_) => {
                return Err(StoreError::MigrationHashMismatch {
                    version: migration.version,
                })
            }
            None => {
                let tx = conn.transaction()?;
                tx.execute_batch(migration.sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (version, content_hash, applied_at)
                     VALUES (?1, ?2, ?3)",
                    params![migration.version, hash, now_ms()],
                )?;
                tx.commit()?;
            }
        }
    }
    Ok(())
}
