//! Row operations for the `node_mapping` remote-identity cache.
//!
//! Maps `(local_path, remote_path)` to the remote node UIDs obtained on a
//! successful create, so renames and deletes can address the same remote
//! object later. Set only after a successful CREATE_*, cleared on DELETE and
//! on orphan cleanup.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct NodeMapping {
    pub local_path: String,
    pub remote_path: String,
    pub node_uid: String,
    pub parent_node_uid: String,
    pub is_directory: bool,
    pub updated_at: i64,
}

fn mapping_from_row(row: &Row<'_>) -> rusqlite::Result<NodeMapping> {
    Ok(NodeMapping {
        local_path: row.get(0)?,
        remote_path: row.get(1)?,
        node_uid: row.get(2)?,
        parent_node_uid: row.get(3)?,
        is_directory: row.get::<_, i64>(4)? != 0,
        updated_at: row.get(5)?,
    })
}

pub fn get(
    conn: &Connection,
    local_path: &str,
    remote_path: &str,
) -> rusqlite::Result<Option<NodeMapping>> {
    conn.query_row(
        "SELECT local_path, remote_path, node_uid, parent_node_uid, is_directory, updated_at
         FROM node_mapping WHERE local_path = ?1 AND remote_path = ?2",
        params![local_path, remote_path],
        mapping_from_row,
    )
    .optional()
}

#[allow(clippy::too_many_arguments)]
pub fn upsert(
    conn: &Connection,
    local_path: &str,
    remote_path: &str,
    node_uid: &str,
    parent_node_uid: &str,
    is_directory: bool,
    now: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO node_mapping
             (local_path, remote_path, node_uid, parent_node_uid, is_directory, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(local_path, remote_path) DO UPDATE SET
             node_uid        = excluded.node_uid,
             parent_node_uid = excluded.parent_node_uid,
             is_directory    = excluded.is_directory,
             updated_at      = excluded.updated_at",
        params![local_path, remote_path, node_uid, parent_node_uid, is_directory as i64, now],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, local_path: &str, remote_path: &str) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "DELETE FROM node_mapping WHERE local_path = ?1 AND remote_path = ?2",
        params![local_path, remote_path],
    )?;
    Ok(n > 0)
}

/// Delete every mapping whose local AND remote paths sit under the given
/// prefixes (directory delete cascade).
pub fn delete_prefix_pair(
    conn: &Connection,
    local_prefix: &str,
    remote_prefix: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM node_mapping
         WHERE substr(local_path, 1, length(?1) + 1) = ?1 || '/'
           AND substr(remote_path, 1, length(?2) + 1) = ?2 || '/'",
        params![local_prefix, remote_prefix],
    )
}

/// Delete mappings not covered by any of `roots` (orphan cleanup).
pub fn delete_outside_roots(conn: &Connection, roots: &[String]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare("SELECT local_path, remote_path FROM node_mapping")?;
    let keys: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;
    let mut removed = 0;
    for (local, remote) in keys {
        let covered = roots.iter().any(|root| crate::paths::path_has_prefix(&local, root));
        if !covered {
            removed += conn.execute(
                "DELETE FROM node_mapping WHERE local_path = ?1 AND remote_path = ?2",
                params![local, remote],
            )?;
        }
    }
    Ok(removed)
}

pub fn count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM node_mapping", [], |row| row.get(0))
}
