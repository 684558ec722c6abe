//! Row operations for `sync_jobs` and `processing_queue`.
//!
//! The job table is upsert-keyed on `(local_path, remote_path)`: a burst of
//! changes to one path collapses into a single PENDING row carrying the
//! newest intent. `processing_queue` rows are the exclusive claims; a claim
//! older than the stale threshold belongs to a dead worker and is reaped on
//! the next claim attempt.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Claims older than this are considered abandoned (10 minutes).
pub const STALE_PROCESSING_MS: i64 = 600_000;

/// What a job asks the remote side to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "CREATE_FILE")]
    CreateFile,
    #[serde(rename = "CREATE_DIR")]
    CreateDir,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CreateFile => "CREATE_FILE",
            EventType::CreateDir => "CREATE_DIR",
            EventType::Update => "UPDATE",
            EventType::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATE_FILE" => Some(EventType::CreateFile),
            "CREATE_DIR" => Some(EventType::CreateDir),
            "UPDATE" => Some(EventType::Update),
            "DELETE" => Some(EventType::Delete),
            _ => None,
        }
    }
}

/// Job lifecycle state. SYNCED and BLOCKED are terminal; retries cycle a job
/// back through PENDING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Synced,
    Blocked,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Synced => "SYNCED",
            JobStatus::Blocked => "BLOCKED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "PROCESSING" => Some(JobStatus::Processing),
            "SYNCED" => Some(JobStatus::Synced),
            "BLOCKED" => Some(JobStatus::Blocked),
            _ => None,
        }
    }
}

/// One durable unit of sync work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: i64,
    pub event_type: EventType,
    pub local_path: String,
    pub remote_path: String,
    pub status: JobStatus,
    pub retry_at: i64,
    pub n_retries: i64,
    pub last_error: Option<String>,
    pub change_token: Option<String>,
    pub created_at: i64,
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<SyncJob> {
    let event_type: String = row.get(1)?;
    let status: String = row.get(4)?;
    Ok(SyncJob {
        id: row.get(0)?,
        event_type: EventType::parse(&event_type).unwrap_or(EventType::Update),
        local_path: row.get(2)?,
        remote_path: row.get(3)?,
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Pending),
        retry_at: row.get(5)?,
        n_retries: row.get(6)?,
        last_error: row.get(7)?,
        change_token: row.get(8)?,
        created_at: row.get(9)?,
    })
}

const JOB_COLUMNS: &str = "id, event_type, local_path, remote_path, status, \
                           retry_at, n_retries, last_error, change_token, created_at";

/// Insert-or-overwrite the job row for `(local_path, remote_path)`.
///
/// An existing row (whatever its status) is reset to PENDING with fresh
/// retry bookkeeping; the newest intent wins. Returns the job id.
pub fn upsert_pending(
    conn: &Connection,
    event_type: EventType,
    local_path: &str,
    remote_path: &str,
    change_token: Option<&str>,
    now: i64,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO sync_jobs
             (event_type, local_path, remote_path, status, retry_at,
              n_retries, last_error, change_token, created_at)
         VALUES (?1, ?2, ?3, 'PENDING', ?4, 0, NULL, ?5, ?4)
         ON CONFLICT(local_path, remote_path) DO UPDATE SET
             event_type   = excluded.event_type,
             status       = 'PENDING',
             retry_at     = excluded.retry_at,
             n_retries    = 0,
             last_error   = NULL,
             change_token = excluded.change_token",
        params![event_type.as_str(), local_path, remote_path, now, change_token],
    )?;
    conn.query_row(
        "SELECT id FROM sync_jobs WHERE local_path = ?1 AND remote_path = ?2",
        params![local_path, remote_path],
        |row| row.get(0),
    )
}

/// Reap claims from dead workers and requeue their orphaned jobs.
///
/// Step one of the claim transaction: claims past the stale threshold are
/// deleted, and any PROCESSING job left without a claim (a crashed worker's)
/// returns to PENDING eligibility.
pub fn reap_stale_claims(conn: &Connection, now: i64) -> rusqlite::Result<usize> {
    let reaped = conn.execute(
        "DELETE FROM processing_queue WHERE started_at <= ?1",
        params![now - STALE_PROCESSING_MS],
    )?;
    conn.execute(
        "UPDATE sync_jobs SET status = 'PENDING'
         WHERE status = 'PROCESSING'
           AND NOT EXISTS (SELECT 1 FROM processing_queue p
                           WHERE p.local_path = sync_jobs.local_path)",
        [],
    )?;
    Ok(reaped)
}

/// Select and claim the next eligible job, if any.
///
/// Eligible: PENDING, due (`retry_at <= now`), and no active claim for its
/// `local_path`. The job with the smallest `retry_at` wins. The winner is
/// flipped to PROCESSING and its claim row upserted, all by the caller's
/// transaction.
pub fn claim_next(conn: &Connection, now: i64) -> rusqlite::Result<Option<SyncJob>> {
    reap_stale_claims(conn, now)?;

    let job = conn
        .query_row(
            &format!(
                "SELECT {JOB_COLUMNS} FROM sync_jobs j
                 WHERE j.status = 'PENDING'
                   AND j.retry_at <= ?1
                   AND NOT EXISTS (SELECT 1 FROM processing_queue p
                                   WHERE p.local_path = j.local_path)
                 ORDER BY j.retry_at ASC
                 LIMIT 1"
            ),
            params![now],
            job_from_row,
        )
        .optional()?;

    let Some(mut job) = job else {
        return Ok(None);
    };

    conn.execute(
        "UPDATE sync_jobs SET status = 'PROCESSING' WHERE id = ?1",
        params![job.id],
    )?;
    conn.execute(
        "INSERT INTO processing_queue (local_path, started_at) VALUES (?1, ?2)
         ON CONFLICT(local_path) DO UPDATE SET started_at = excluded.started_at",
        params![job.local_path, now],
    )?;
    job.status = JobStatus::Processing;
    Ok(Some(job))
}

/// Terminal SYNCED transition, gated on the row still being PROCESSING.
///
/// The claim row is removed unconditionally. Returns whether the job row was
/// actually updated (false means a superseding enqueue got there first).
pub fn mark_synced(conn: &Connection, id: i64, local_path: &str) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE sync_jobs SET status = 'SYNCED', last_error = NULL
         WHERE id = ?1 AND status = 'PROCESSING'",
        params![id],
    )?;
    release_claim(conn, local_path)?;
    Ok(updated > 0)
}

/// Terminal BLOCKED transition, same gating as [`mark_synced`].
pub fn mark_blocked(
    conn: &Connection,
    id: i64,
    local_path: &str,
    error: &str,
) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE sync_jobs SET status = 'BLOCKED', last_error = ?2
         WHERE id = ?1 AND status = 'PROCESSING'",
        params![id, error],
    )?;
    release_claim(conn, local_path)?;
    Ok(updated > 0)
}

/// Return a failed job to PENDING with a future `retry_at`.
///
/// Gated on PROCESSING like the terminal transitions so a superseding
/// enqueue (which already reset the row) is never clobbered.
pub fn schedule_retry(
    conn: &Connection,
    id: i64,
    local_path: &str,
    retry_at: i64,
    n_retries: i64,
    error: &str,
) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE sync_jobs
         SET status = 'PENDING', retry_at = ?2, n_retries = ?3, last_error = ?4
         WHERE id = ?1 AND status = 'PROCESSING'",
        params![id, retry_at, n_retries, error],
    )?;
    release_claim(conn, local_path)?;
    Ok(updated > 0)
}

/// Drop the claim row for `local_path`.
pub fn release_claim(conn: &Connection, local_path: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM processing_queue WHERE local_path = ?1",
        params![local_path],
    )?;
    Ok(())
}

/// Bound the SYNCED backlog: above `high`, delete the oldest rows down to
/// `low`. Returns how many were deleted.
pub fn prune_synced(conn: &Connection, high: i64, low: i64) -> rusqlite::Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sync_jobs WHERE status = 'SYNCED'",
        [],
        |row| row.get(0),
    )?;
    if count <= high {
        return Ok(0);
    }
    let excess = count - low;
    let deleted = conn.execute(
        "DELETE FROM sync_jobs WHERE id IN (
             SELECT id FROM sync_jobs WHERE status = 'SYNCED'
             ORDER BY id ASC LIMIT ?1)",
        params![excess],
    )?;
    Ok(deleted)
}

pub fn get(conn: &Connection, id: i64) -> rusqlite::Result<Option<SyncJob>> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE id = ?1"),
        params![id],
        job_from_row,
    )
    .optional()
}

pub fn get_by_paths(
    conn: &Connection,
    local_path: &str,
    remote_path: &str,
) -> rusqlite::Result<Option<SyncJob>> {
    conn.query_row(
        &format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs
             WHERE local_path = ?1 AND remote_path = ?2"
        ),
        params![local_path, remote_path],
        job_from_row,
    )
    .optional()
}

/// Jobs filtered by status (or all), newest first.
pub fn list(
    conn: &Connection,
    status: Option<JobStatus>,
    limit: i64,
) -> rusqlite::Result<Vec<SyncJob>> {
    let mut out = Vec::new();
    match status {
        Some(status) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM sync_jobs WHERE status = ?1
                 ORDER BY id DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![status.as_str(), limit], job_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM sync_jobs ORDER BY id DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], job_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
    }
    Ok(out)
}

/// Job counts per status, for `skysync status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobCounts {
    pub pending: i64,
    pub processing: i64,
    pub synced: i64,
    pub blocked: i64,
}

pub fn counts(conn: &Connection) -> rusqlite::Result<JobCounts> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM sync_jobs GROUP BY status")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut counts = JobCounts::default();
    for row in rows {
        let (status, n) = row?;
        match JobStatus::parse(&status) {
            Some(JobStatus::Pending) => counts.pending = n,
            Some(JobStatus::Processing) => counts.processing = n,
            Some(JobStatus::Synced) => counts.synced = n,
            Some(JobStatus::Blocked) => counts.blocked = n,
            None => {}
        }
    }
    Ok(counts)
}

/// Drop every BLOCKED row (operator reset). Returns how many were removed.
pub fn delete_blocked(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM sync_jobs WHERE status = 'BLOCKED'", [])
}

/// Count of active claims, for tests and status output.
pub fn claim_count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM processing_queue", [], |row| row.get(0))
}

/// The claim row's `started_at` for a path, if one exists.
pub fn claim_started_at(conn: &Connection, local_path: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT started_at FROM processing_queue WHERE local_path = ?1",
        params![local_path],
        |row| row.get(0),
    )
    .optional()
}
