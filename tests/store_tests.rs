//! Store-level tests: migrations, flags, persistence across reopen.

use skysync::store::{flags, migrations, signals, Store};
use tempfile::TempDir;

#[test]
fn open_creates_schema_on_disk() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("state.db");
    let store = Store::open(&db_path).unwrap();

    let applied: i64 = store
        .with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
        })
        .unwrap();
    assert_eq!(applied as usize, migrations::MIGRATIONS.len());
    assert!(db_path.exists());
}

#[test]
fn reopen_preserves_state_and_skips_migrations() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("state.db");
    {
        let store = Store::open(&db_path).unwrap();
        store
            .with_conn(|conn| flags::set(conn, "PAUSED", 123))
            .unwrap();
    }
    let store = Store::open(&db_path).unwrap();
    assert!(store.with_conn(|conn| flags::is_set(conn, "PAUSED")).unwrap());

    let applied: i64 = store
        .with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
        })
        .unwrap();
    assert_eq!(applied as usize, migrations::MIGRATIONS.len());
}

#[test]
fn open_creates_missing_parent_dirs() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested/deeper/state.db");
    Store::open(&db_path).unwrap();
    assert!(db_path.exists());
}

#[test]
fn flag_set_is_idempotent_and_clear_reports_presence() {
    let store = Store::open_in_memory().unwrap();
    store.with_conn(|conn| flags::set(conn, "PAUSED", 1)).unwrap();
    store.with_conn(|conn| flags::set(conn, "PAUSED", 2)).unwrap();
    assert!(store.with_conn(|conn| flags::clear(conn, "PAUSED")).unwrap());
    assert!(!store.with_conn(|conn| flags::clear(conn, "PAUSED")).unwrap());
}

#[test]
fn running_pid_flag_round_trips() {
    let store = Store::open_in_memory().unwrap();
    store
        .with_conn(|conn| flags::set(conn, "running_pid:4242", 1))
        .unwrap();
    let holder = store.with_conn(flags::running_pid).unwrap();
    assert_eq!(holder, Some(("running_pid:4242".to_string(), 4242)));
}

#[test]
fn signals_are_ordered_and_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("state.db");
    {
        let store = Store::open(&db_path).unwrap();
        store.with_conn(|conn| signals::send(conn, "pause-sync", 1)).unwrap();
        store.with_conn(|conn| signals::send(conn, "reconcile", 2)).unwrap();
    }
    let store = Store::open(&db_path).unwrap();
    let rows = store.with_conn(signals::list).unwrap();
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["pause-sync", "reconcile"]);
}
