//! Row operations for the `file_state` change-detection cache.
//!
//! One row per synced file: the `"mtime_ms:size"` token last pushed to the
//! remote. The classifier compares incoming events against it to suppress
//! no-op work.

use rusqlite::{params, Connection, OptionalExtension};

pub fn get_token(conn: &Connection, local_path: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT change_token FROM file_state WHERE local_path = ?1",
        params![local_path],
        |row| row.get(0),
    )
    .optional()
}

pub fn upsert(
    conn: &Connection,
    local_path: &str,
    change_token: &str,
    now: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO file_state (local_path, change_token, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(local_path) DO UPDATE SET
             change_token = excluded.change_token,
             updated_at   = excluded.updated_at",
        params![local_path, change_token, now],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, local_path: &str) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "DELETE FROM file_state WHERE local_path = ?1",
        params![local_path],
    )?;
    Ok(n > 0)
}

/// Delete every row under `local_prefix/` (directory delete cascade).
///
/// Uses a length-anchored substring compare instead of LIKE so paths with
/// `%` or `_` in them behave.
pub fn delete_prefix(conn: &Connection, local_prefix: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM file_state
         WHERE substr(local_path, 1, length(?1) + 1) = ?1 || '/'",
        params![local_prefix],
    )
}

/// Delete rows not covered by any of `roots` (orphan cleanup).
pub fn delete_outside_roots(conn: &Connection, roots: &[String]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare("SELECT local_path FROM file_state")?;
    let paths: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    let mut removed = 0;
    for path in paths {
        let covered = roots.iter().any(|root| crate::paths::path_has_prefix(&path, root));
        if !covered {
            removed += conn.execute(
                "DELETE FROM file_state WHERE local_path = ?1",
                params![path],
            )?;
        }
    }
    Ok(removed)
}

pub fn count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM file_state", [], |row| row.get(0))
}
