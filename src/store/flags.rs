//! Row operations for the `flags` table: sticky named bits of daemon state.
//!
//! `PAUSED` freezes job claims; `running_pid:<N>` is the single-holder
//! run-lock lease. Stale pid flags (dead holder) are garbage-collected
//! during lock acquisition.

use rusqlite::{params, Connection, OptionalExtension};

/// Pause flag: set freezes new job claims, clear resumes them.
pub const PAUSED: &str = "PAUSED";

/// Prefix of the run-lock flag; the suffix is the holder's pid.
pub const RUNNING_PID_PREFIX: &str = "running_pid:";

pub fn set(conn: &Connection, name: &str, now: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO flags (name, created_at) VALUES (?1, ?2)
         ON CONFLICT(name) DO NOTHING",
        params![name, now],
    )?;
    Ok(())
}

pub fn clear(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    let n = conn.execute("DELETE FROM flags WHERE name = ?1", params![name])?;
    Ok(n > 0)
}

pub fn is_set(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    let row: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM flags WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(row.is_some())
}

/// The current run-lock flag, parsed as `(flag_name, pid)`.
///
/// A flag whose suffix does not parse as a pid is treated as stale garbage
/// and reported with pid 0 so acquisition can clear it.
pub fn running_pid(conn: &Connection) -> rusqlite::Result<Option<(String, i32)>> {
    let name: Option<String> = conn
        .query_row(
            "SELECT name FROM flags WHERE name LIKE 'running_pid:%' LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(name.map(|name| {
        let pid = name[RUNNING_PID_PREFIX.len()..].parse().unwrap_or(0);
        (name, pid)
    }))
}

pub fn list(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM flags ORDER BY name")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}
