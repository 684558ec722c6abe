//! End-to-end pipeline scenarios: classifier -> queue -> processor against
//! the scriptable fake remote.

use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, RwLock};

use skysync::classifier::ChangeClassifier;
use skysync::config::{Config, SyncDir};
use skysync::events::EventBus;
use skysync::exclude::GlobCache;
use skysync::processor::Processor;
use skysync::queue::JobQueue;
use skysync::remote::fake::{FakeCall, FakeRemote};
use skysync::remote::DeleteBehavior;
use skysync::store::jobs::{self, EventType, JobStatus};
use skysync::store::{file_state, flags, node_mapping, now_ms, Store};
use skysync::watcher::{EntryKind, FileChange};
use tempfile::TempDir;

struct Pipeline {
    _local: TempDir,
    root: String,
    store: Arc<Store>,
    classifier: ChangeClassifier,
    fake: Arc<FakeRemote>,
    processor: Arc<Processor>,
    concurrency: Arc<AtomicUsize>,
}

fn pipeline() -> Pipeline {
    pipeline_with(DeleteBehavior::Trash, 4)
}

fn pipeline_with(delete_behavior: DeleteBehavior, concurrency: usize) -> Pipeline {
    let local = TempDir::new().unwrap();
    let root = local.path().to_string_lossy().to_string();

    let store = Arc::new(Store::open_in_memory().unwrap());
    let events = EventBus::new();
    let config = Arc::new(RwLock::new(Config {
        sync_dirs: vec![SyncDir {
            source_path: root.clone(),
            remote_root: "/r".to_string(),
        }],
        remote_delete_behavior: delete_behavior,
        ..Config::default()
    }));

    let classifier = ChangeClassifier::new(
        store.clone(),
        events.clone(),
        config.clone(),
        Arc::new(GlobCache::new()),
    );
    let queue = Arc::new(JobQueue::new(store.clone(), events));
    let fake = Arc::new(FakeRemote::new());
    let concurrency = Arc::new(AtomicUsize::new(concurrency));
    let processor = Arc::new(Processor::new(
        store.clone(),
        queue,
        fake.clone(),
        config,
        concurrency.clone(),
    ));

    Pipeline {
        _local: local,
        root,
        store,
        classifier,
        fake,
        processor,
        concurrency,
    }
}

impl Pipeline {
    fn write_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = PathBuf::from(&self.root).join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn change(&self, name: &str, exists: bool, is_new: bool, mtime_ms: i64, size: u64) -> FileChange {
        FileChange {
            watch_root: self.root.clone(),
            name: name.to_string(),
            kind: EntryKind::File,
            exists,
            is_new,
            mtime_ms,
            size,
        }
    }

    fn local(&self, name: &str) -> String {
        format!("{}/{}", self.root, name)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn new_file_upload_records_full_state() {
    let p = pipeline();
    p.write_file("a.txt", b"0123456789");

    p.classifier
        .handle_change(&p.change("a.txt", true, true, 1_700_000_000_000, 10))
        .unwrap()
        .unwrap();
    p.processor.drain_queue().await.unwrap();

    let job = p
        .store
        .with_conn(|conn| jobs::get_by_paths(conn, &p.local("a.txt"), "/r/a.txt"))
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Synced);
    assert!(job.last_error.is_none());

    let token = p
        .store
        .with_conn(|conn| file_state::get_token(conn, &p.local("a.txt")))
        .unwrap();
    assert_eq!(token.as_deref(), Some("1700000000000:10"));

    let mapping = p
        .store
        .with_conn(|conn| node_mapping::get(conn, &p.local("a.txt"), "/r/a.txt"))
        .unwrap()
        .unwrap();
    assert_eq!(mapping.node_uid, "N1");
    assert_eq!(mapping.parent_node_uid, "P1");
    assert!(!mapping.is_directory);
}

#[tokio::test(flavor = "multi_thread")]
async fn rescan_after_sync_is_a_noop() {
    let p = pipeline();
    p.write_file("a.txt", b"0123456789");

    p.classifier
        .handle_change(&p.change("a.txt", true, true, 1_700_000_000_000, 10))
        .unwrap()
        .unwrap();
    p.processor.drain_queue().await.unwrap();

    // The same observation again, now not new: suppressed by the token.
    let outcome = p
        .classifier
        .handle_change(&p.change("a.txt", true, false, 1_700_000_000_000, 10))
        .unwrap();
    assert!(outcome.is_none());

    let counts = p.store.with_conn(jobs::counts).unwrap();
    assert_eq!(counts.synced, 1);
    assert_eq!(counts.pending, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn directory_create_maps_remote_folder() {
    let p = pipeline();
    std::fs::create_dir(PathBuf::from(&p.root).join("docs")).unwrap();
    let change = FileChange {
        kind: EntryKind::Dir,
        ..p.change("docs", true, true, 1_700_000_000_000, 0)
    };
    p.classifier.handle_change(&change).unwrap().unwrap();
    p.processor.drain_queue().await.unwrap();

    let mapping = p
        .store
        .with_conn(|conn| node_mapping::get(conn, &p.local("docs"), "/r/docs"))
        .unwrap()
        .unwrap();
    assert!(mapping.is_directory);
    assert_eq!(p.fake.calls(), vec![FakeCall::CreateFolder("/r/docs".to_string())]);
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_respects_configured_behavior() {
    let p = pipeline_with(DeleteBehavior::Permanent, 4);
    p.classifier
        .handle_change(&p.change("gone.txt", false, false, 0, 0))
        .unwrap()
        .unwrap();
    p.processor.drain_queue().await.unwrap();

    let job = p
        .store
        .with_conn(|conn| jobs::get_by_paths(conn, &p.local("gone.txt"), "/r/gone.txt"))
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Synced);
    assert_eq!(
        p.fake.calls(),
        vec![FakeCall::Delete("/r/gone.txt".to_string(), true)]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_local_file_schedules_local_not_found_retry() {
    let p = pipeline();
    // Enqueue directly for a path that does not exist on disk.
    p.store
        .with_tx(|tx| {
            jobs::upsert_pending(
                tx,
                EventType::CreateFile,
                &p.local("vanished.txt"),
                "/r/vanished.txt",
                Some("1:1"),
                now_ms(),
            )
        })
        .unwrap();
    p.processor.drain_queue().await.unwrap();

    let job = p
        .store
        .with_conn(|conn| jobs::get_by_paths(conn, &p.local("vanished.txt"), "/r/vanished.txt"))
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.n_retries, 1);
    assert!(job.last_error.unwrap().contains("no such file or directory"));
    // The upload never reached the remote.
    assert!(p.fake.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_reupload_deletes_and_recreates() {
    let p = pipeline();
    p.write_file("a.txt", b"fresh");
    p.store
        .with_tx(|tx| {
            let id = jobs::upsert_pending(
                tx,
                EventType::CreateFile,
                &p.local("a.txt"),
                "/r/a.txt",
                Some("1:5"),
                now_ms(),
            )?;
            tx.execute("UPDATE sync_jobs SET n_retries = 3 WHERE id = ?1", [id])?;
            Ok(())
        })
        .unwrap();

    // The next upload still reports the draft-revision conflict; the worker
    // must fall back to delete-then-recreate within the same claim.
    p.fake.push_failure("draft revision already exists");
    p.processor.drain_queue().await.unwrap();

    let job = p
        .store
        .with_conn(|conn| jobs::get_by_paths(conn, &p.local("a.txt"), "/r/a.txt"))
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Synced);

    let calls = p.fake.calls();
    assert_eq!(
        calls,
        vec![
            FakeCall::Upload("/r/a.txt".to_string()),
            FakeCall::Delete("/r/a.txt".to_string(), false),
            FakeCall::Upload("/r/a.txt".to_string()),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn pause_freezes_claims_until_resume() {
    let p = pipeline_with(DeleteBehavior::Trash, 2);
    // Keep workers observably in flight while the pause lands.
    p.fake.set_delay(std::time::Duration::from_millis(200));
    for name in ["a.txt", "b.txt", "c.txt"] {
        p.write_file(name, b"x");
        p.classifier
            .handle_change(&p.change(name, true, true, 1, 1))
            .unwrap()
            .unwrap();
    }

    // One tick with a pool of two: exactly two claims.
    let claimed = p.processor.process_available_jobs().unwrap();
    assert_eq!(claimed, 2);

    // Pause lands while they are in flight; both finish, nothing new starts.
    p.store
        .with_conn(|conn| flags::set(conn, flags::PAUSED, now_ms()))
        .unwrap();
    p.processor.wait_for_active_tasks().await;

    let counts = p.store.with_conn(jobs::counts).unwrap();
    assert_eq!(counts.synced, 2);
    assert_eq!(counts.pending, 1);

    assert_eq!(p.processor.process_available_jobs().unwrap(), 0);

    // Resume: the next tick picks up the remaining job.
    p.store
        .with_conn(|conn| flags::clear(conn, flags::PAUSED))
        .unwrap();
    assert_eq!(p.processor.process_available_jobs().unwrap(), 1);
    p.processor.wait_for_active_tasks().await;

    let counts = p.store.with_conn(jobs::counts).unwrap();
    assert_eq!(counts.synced, 3);
    assert_eq!(counts.pending, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrency_knob_bounds_the_pool() {
    let p = pipeline_with(DeleteBehavior::Trash, 1);
    p.fake.set_delay(std::time::Duration::from_millis(100));
    for name in ["a.txt", "b.txt"] {
        p.write_file(name, b"x");
        p.classifier
            .handle_change(&p.change(name, true, true, 1, 1))
            .unwrap()
            .unwrap();
    }

    assert_eq!(p.processor.process_available_jobs().unwrap(), 1);

    // Resizing at runtime widens the next tick.
    p.concurrency.store(2, std::sync::atomic::Ordering::SeqCst);
    p.processor.wait_for_active_tasks().await;
    assert!(p.processor.process_available_jobs().unwrap() >= 1);
    p.processor.wait_for_active_tasks().await;

    let counts = p.store.with_conn(jobs::counts).unwrap();
    assert_eq!(counts.synced, 2);
}
