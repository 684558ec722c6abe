//! Job-queue semantics: upsert keying, claim exclusivity, stale reclaim,
//! terminal gating, and the SYNCED watermark prune.

use std::sync::Arc;

use skysync::events::EventBus;
use skysync::queue::{JobQueue, SYNCED_HIGH_WATERMARK, SYNCED_LOW_WATERMARK};
use skysync::store::jobs::{self, EventType, JobStatus, STALE_PROCESSING_MS};
use skysync::store::{now_ms, Store};

fn queue_fixture() -> (Arc<Store>, JobQueue) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let queue = JobQueue::new(store.clone(), EventBus::new());
    (store, queue)
}

fn enqueue(store: &Store, event: EventType, local: &str, remote: &str, token: &str) -> i64 {
    store
        .with_tx(|tx| jobs::upsert_pending(tx, event, local, remote, Some(token), now_ms()))
        .unwrap()
}

fn make_due(store: &Store, id: i64) {
    store
        .with_conn(|conn| {
            conn.execute("UPDATE sync_jobs SET retry_at = 0 WHERE id = ?1", [id])
        })
        .unwrap();
}

#[test]
fn upsert_keeps_one_row_per_path_pair() {
    let (store, _queue) = queue_fixture();
    let id1 = enqueue(&store, EventType::CreateFile, "/s/a.txt", "/r/a.txt", "1:1");
    let id2 = enqueue(&store, EventType::Update, "/s/a.txt", "/r/a.txt", "2:2");
    assert_eq!(id1, id2);

    let count: i64 = store
        .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM sync_jobs", [], |r| r.get(0)))
        .unwrap();
    assert_eq!(count, 1);

    let job = store
        .with_conn(|conn| jobs::get(conn, id1))
        .unwrap()
        .unwrap();
    assert_eq!(job.event_type, EventType::Update);
    assert_eq!(job.change_token.as_deref(), Some("2:2"));
    assert_eq!(job.n_retries, 0);
    assert_eq!(job.status, JobStatus::Pending);
}

#[test]
fn rapid_overwrite_claims_the_newest_intent() {
    // CREATE_FILE(T1) then UPDATE(T2) before any claim: the claim sees one
    // job carrying the UPDATE and T2; the T1 job never existed as a row of
    // its own.
    let (store, queue) = queue_fixture();
    enqueue(&store, EventType::CreateFile, "/s/a.txt", "/r/a.txt", "T1");
    enqueue(&store, EventType::Update, "/s/a.txt", "/r/a.txt", "T2");

    let claimed = queue.claim_next_pending_job().unwrap().unwrap();
    assert_eq!(claimed.event_type, EventType::Update);
    assert_eq!(claimed.change_token.as_deref(), Some("T2"));
    assert!(queue.claim_next_pending_job().unwrap().is_none());
}

#[test]
fn claim_is_exclusive_per_local_path() {
    let (store, queue) = queue_fixture();
    // Same local path mapped into two remotes; only one may process at once.
    enqueue(&store, EventType::CreateFile, "/s/a.txt", "/r1/a.txt", "1:1");
    enqueue(&store, EventType::CreateFile, "/s/a.txt", "/r2/a.txt", "1:1");

    let first = queue.claim_next_pending_job().unwrap().unwrap();
    assert_eq!(first.local_path, "/s/a.txt");
    assert!(queue.claim_next_pending_job().unwrap().is_none());

    let processing: i64 = store
        .with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM sync_jobs WHERE status = 'PROCESSING'",
                [],
                |r| r.get(0),
            )
        })
        .unwrap();
    assert_eq!(processing, 1);
    assert_eq!(store.with_conn(jobs::claim_count).unwrap(), 1);
}

#[test]
fn future_retry_at_is_not_claimable() {
    let (store, queue) = queue_fixture();
    let id = enqueue(&store, EventType::CreateFile, "/s/a.txt", "/r/a.txt", "1:1");
    store
        .with_conn(|conn| {
            conn.execute(
                "UPDATE sync_jobs SET retry_at = ?1 WHERE id = ?2",
                rusqlite::params![now_ms() + 60_000, id],
            )
        })
        .unwrap();
    assert!(queue.claim_next_pending_job().unwrap().is_none());
}

#[test]
fn stale_claim_is_reaped_and_job_reclaimed() {
    let (store, queue) = queue_fixture();
    let id = enqueue(&store, EventType::CreateFile, "/s/a.txt", "/r/a.txt", "1:1");

    let claimed = queue.claim_next_pending_job().unwrap().unwrap();
    assert_eq!(claimed.id, id);

    // Nothing else is claimable while the claim is fresh.
    assert!(queue.claim_next_pending_job().unwrap().is_none());

    // Age the claim past the stale threshold: a crashed worker.
    store
        .with_conn(|conn| {
            conn.execute(
                "UPDATE processing_queue SET started_at = ?1",
                [now_ms() - STALE_PROCESSING_MS - 1],
            )
        })
        .unwrap();

    let reclaimed = queue.claim_next_pending_job().unwrap().unwrap();
    assert_eq!(reclaimed.id, id);
    assert_eq!(store.with_conn(jobs::claim_count).unwrap(), 1);
}

#[test]
fn terminal_set_is_noop_after_superseding_enqueue() {
    let (store, queue) = queue_fixture();
    enqueue(&store, EventType::CreateFile, "/s/a.txt", "/r/a.txt", "T1");
    let claimed = queue.claim_next_pending_job().unwrap().unwrap();

    // New intent lands while the worker is in flight.
    enqueue(&store, EventType::Update, "/s/a.txt", "/r/a.txt", "T2");

    // The worker finishes; its terminal update must not clobber the fresh
    // PENDING row.
    assert!(!queue.mark_synced(&claimed).unwrap());
    let job = store
        .with_conn(|conn| jobs::get(conn, claimed.id))
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.change_token.as_deref(), Some("T2"));

    // The claim row went away regardless, so the new intent is claimable.
    let reclaimed = queue.claim_next_pending_job().unwrap().unwrap();
    assert_eq!(reclaimed.change_token.as_deref(), Some("T2"));
}

#[test]
fn synced_and_blocked_are_terminal_until_reenqueued() {
    let (store, queue) = queue_fixture();
    let id = enqueue(&store, EventType::CreateFile, "/s/a.txt", "/r/a.txt", "1:1");
    let claimed = queue.claim_next_pending_job().unwrap().unwrap();
    assert!(queue.mark_synced(&claimed).unwrap());

    // A terminal row is not claimable.
    assert!(queue.claim_next_pending_job().unwrap().is_none());

    // Re-enqueue brings it back through PENDING.
    make_due(&store, id);
    enqueue(&store, EventType::Update, "/s/a.txt", "/r/a.txt", "2:2");
    let again = queue.claim_next_pending_job().unwrap().unwrap();
    assert_eq!(again.id, id);
    assert!(queue.mark_blocked(&again, "quota exceeded").unwrap());

    let job = store.with_conn(|conn| jobs::get(conn, id)).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Blocked);
    assert_eq!(job.last_error.as_deref(), Some("quota exceeded"));
}

#[test]
fn synced_backlog_is_pruned_at_the_watermark() {
    let (store, queue) = queue_fixture();

    // Fill past the high watermark with SYNCED rows.
    store
        .with_tx(|tx| {
            for i in 0..SYNCED_HIGH_WATERMARK {
                tx.execute(
                    "INSERT INTO sync_jobs
                         (event_type, local_path, remote_path, status, retry_at, created_at)
                     VALUES ('CREATE_FILE', ?1, ?2, 'SYNCED', 0, ?3)",
                    rusqlite::params![
                        format!("/s/f{i}"),
                        format!("/r/f{i}"),
                        i
                    ],
                )?;
            }
            Ok(())
        })
        .unwrap();

    // One more synced job tips the count over the watermark.
    enqueue(&store, EventType::CreateFile, "/s/last", "/r/last", "1:1");
    let claimed = queue.claim_next_pending_job().unwrap().unwrap();
    assert!(queue.mark_synced(&claimed).unwrap());

    let synced: i64 = store
        .with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM sync_jobs WHERE status = 'SYNCED'",
                [],
                |r| r.get(0),
            )
        })
        .unwrap();
    assert_eq!(synced, SYNCED_LOW_WATERMARK);

    // The oldest rows went first; the newest survives.
    let newest = store
        .with_conn(|conn| jobs::get_by_paths(conn, "/s/last", "/r/last"))
        .unwrap();
    assert!(newest.is_some());
    let oldest = store
        .with_conn(|conn| jobs::get_by_paths(conn, "/s/f0", "/r/f0"))
        .unwrap();
    assert!(oldest.is_none());
}
