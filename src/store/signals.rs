//! Row operations for the `signals` table: transient inter-process messages.
//!
//! Sibling CLI processes insert rows; the running daemon polls and consumes
//! them. A row is deleted before its action runs, so a listener that exits
//! the process never leaves the signal behind. Unknown names accumulate
//! until a handler exists or the next daemon start clears them.

use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone)]
pub struct SignalRow {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

pub fn send(conn: &Connection, name: &str, now: i64) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO signals (name, created_at) VALUES (?1, ?2)",
        params![name, now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// All pending signals, oldest first.
pub fn list(conn: &Connection) -> rusqlite::Result<Vec<SignalRow>> {
    let mut stmt =
        conn.prepare("SELECT id, name, created_at FROM signals ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(SignalRow {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Consume one signal row. Returns false when another listener got it first.
pub fn consume(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let n = conn.execute("DELETE FROM signals WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

pub fn exists(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let row: Option<i64> = conn
        .query_row("SELECT 1 FROM signals WHERE id = ?1", params![id], |row| row.get(0))
        .optional()?;
    Ok(row.is_some())
}

/// Drop every pending signal (stale after a dead daemon is reaped).
pub fn clear_all(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM signals", [])
}
