//! Retry policy through the queue: category-driven scheduling, jitter
//! bounds, network clamping, and exhaustion into BLOCKED.

use std::sync::Arc;

use skysync::events::EventBus;
use skysync::queue::{FailureOutcome, JobQueue};
use skysync::retry::ErrorCategory;
use skysync::store::jobs::{self, EventType, JobStatus};
use skysync::store::{now_ms, Store};

fn queue_fixture() -> (Arc<Store>, JobQueue) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let queue = JobQueue::new(store.clone(), EventBus::new());
    (store, queue)
}

fn enqueue_one(store: &Store) -> i64 {
    store
        .with_tx(|tx| {
            jobs::upsert_pending(tx, EventType::CreateFile, "/s/a.txt", "/r/a.txt", Some("1:1"), now_ms())
        })
        .unwrap()
}

fn make_due(store: &Store, id: i64) {
    store
        .with_conn(|conn| conn.execute("UPDATE sync_jobs SET retry_at = 0 WHERE id = ?1", [id]))
        .unwrap();
}

#[test]
fn network_failure_schedules_first_retry_around_one_second() {
    let (store, queue) = queue_fixture();
    let id = enqueue_one(&store);
    let claimed = queue.claim_next_pending_job().unwrap().unwrap();

    let before = now_ms();
    let outcome = queue.record_failure(&claimed, "read ECONNRESET").unwrap();
    assert_eq!(
        outcome,
        FailureOutcome::Scheduled { category: ErrorCategory::Network, n_retries: 1 }
    );

    let job = store.with_conn(|conn| jobs::get(conn, id)).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.n_retries, 1);
    assert_eq!(job.last_error.as_deref(), Some("read ECONNRESET"));

    // Base 1 s, ±25 %, clamped to >= 1 s; allow slop for test execution.
    let delay = job.retry_at - before;
    assert!((1_000..=1_500).contains(&delay), "delay was {delay} ms");
}

#[test]
fn network_failures_never_block_and_clamp_retries() {
    let (store, queue) = queue_fixture();
    let id = enqueue_one(&store);

    for _ in 0..12 {
        make_due(&store, id);
        let claimed = queue.claim_next_pending_job().unwrap().unwrap();
        let outcome = queue.record_failure(&claimed, "connect ETIMEDOUT").unwrap();
        assert!(matches!(outcome, FailureOutcome::Scheduled { .. }));
    }

    let job = store.with_conn(|conn| jobs::get(conn, id)).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.n_retries, 5, "n_retries must clamp at the network cap");

    // The delay stays capped at the 256 s schedule entry (±25 %).
    make_due(&store, id);
    let claimed = queue.claim_next_pending_job().unwrap().unwrap();
    let before = now_ms();
    queue.record_failure(&claimed, "connect ETIMEDOUT").unwrap();
    let job = store.with_conn(|conn| jobs::get(conn, id)).unwrap().unwrap();
    let delay = job.retry_at - before;
    assert!((192_000..=321_000).contains(&delay), "delay was {delay} ms");
}

#[test]
fn eleven_other_failures_block_with_final_error() {
    let (store, queue) = queue_fixture();
    let id = enqueue_one(&store);

    for attempt in 1..=11 {
        make_due(&store, id);
        let claimed = queue.claim_next_pending_job().unwrap().unwrap();
        let message = format!("mysterious failure #{attempt}");
        let outcome = queue.record_failure(&claimed, &message).unwrap();
        if attempt < 11 {
            assert!(
                matches!(outcome, FailureOutcome::Scheduled { category: ErrorCategory::Other, .. }),
                "attempt {attempt} should retry"
            );
        } else {
            assert_eq!(outcome, FailureOutcome::Blocked { category: ErrorCategory::Other });
        }
    }

    let job = store.with_conn(|conn| jobs::get(conn, id)).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Blocked);
    assert_eq!(job.last_error.as_deref(), Some("mysterious failure #11"));
}

#[test]
fn auth_failure_blocks_immediately() {
    let (store, queue) = queue_fixture();
    let id = enqueue_one(&store);
    let claimed = queue.claim_next_pending_job().unwrap().unwrap();

    let outcome = queue.record_failure(&claimed, "401 Unauthorized").unwrap();
    assert_eq!(outcome, FailureOutcome::Blocked { category: ErrorCategory::Auth });

    let job = store.with_conn(|conn| jobs::get(conn, id)).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Blocked);
    assert_eq!(job.n_retries, 0);
}

#[test]
fn reupload_retries_fixed_then_escalates() {
    let (store, queue) = queue_fixture();
    let id = enqueue_one(&store);

    for attempt in 1..=3 {
        make_due(&store, id);
        let claimed = queue.claim_next_pending_job().unwrap().unwrap();
        let before = now_ms();
        let outcome = queue
            .record_failure(&claimed, "draft revision already exists")
            .unwrap();
        assert!(
            matches!(
                outcome,
                FailureOutcome::Scheduled { category: ErrorCategory::ReuploadNeeded, .. }
            ),
            "attempt {attempt} should retry"
        );
        let job = store.with_conn(|conn| jobs::get(conn, id)).unwrap().unwrap();
        let delay = job.retry_at - before;
        // Fixed 256 s base, ±25 %.
        assert!((192_000..=321_000).contains(&delay), "delay was {delay} ms");
    }

    // Fourth attempt: the worker is told to delete-then-recreate.
    make_due(&store, id);
    let claimed = queue.claim_next_pending_job().unwrap().unwrap();
    let outcome = queue
        .record_failure(&claimed, "draft revision already exists")
        .unwrap();
    assert_eq!(outcome, FailureOutcome::NeedsReupload);

    // The job is still claimed; nothing else may grab the path meanwhile.
    let job = store.with_conn(|conn| jobs::get(conn, id)).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
}

#[test]
fn local_not_found_blocks_after_three_attempts() {
    let (store, queue) = queue_fixture();
    let id = enqueue_one(&store);

    for attempt in 1..=3 {
        make_due(&store, id);
        let claimed = queue.claim_next_pending_job().unwrap().unwrap();
        let outcome = queue
            .record_failure(&claimed, "ENOENT: no such file or directory")
            .unwrap();
        if attempt < 3 {
            assert!(matches!(
                outcome,
                FailureOutcome::Scheduled { category: ErrorCategory::LocalNotFound, .. }
            ));
        } else {
            assert_eq!(
                outcome,
                FailureOutcome::Blocked { category: ErrorCategory::LocalNotFound }
            );
        }
    }

    let job = store.with_conn(|conn| jobs::get(conn, id)).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Blocked);
}
