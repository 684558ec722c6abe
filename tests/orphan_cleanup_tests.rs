//! Orphan cleanup: after a sync-dir shrinks, no cached state survives
//! outside the remaining roots.

use skysync::store::{file_state, node_mapping, Store};

fn seed(store: &Store) {
    store
        .with_tx(|tx| {
            file_state::upsert(tx, "/keep/a.txt", "1:1", 1)?;
            file_state::upsert(tx, "/keep/sub/b.txt", "1:1", 1)?;
            file_state::upsert(tx, "/gone/c.txt", "1:1", 1)?;
            file_state::upsert(tx, "/keeper/d.txt", "1:1", 1)?;
            node_mapping::upsert(tx, "/keep/a.txt", "/r/a.txt", "N1", "P1", false, 1)?;
            node_mapping::upsert(tx, "/gone/c.txt", "/r/c.txt", "N2", "P2", false, 1)?;
            node_mapping::upsert(tx, "/keeper/d.txt", "/r/d.txt", "N3", "P3", false, 1)?;
            Ok(())
        })
        .unwrap();
}

#[test]
fn cleanup_removes_rows_outside_remaining_roots() {
    let store = Store::open_in_memory().unwrap();
    seed(&store);

    let roots = vec!["/keep".to_string()];
    let removed = store
        .with_tx(|tx| {
            let files = file_state::delete_outside_roots(tx, &roots)?;
            let mappings = node_mapping::delete_outside_roots(tx, &roots)?;
            Ok(files + mappings)
        })
        .unwrap();
    assert_eq!(removed, 4);

    // /keeper is NOT covered by /keep: prefix matching stops at `/`.
    assert!(store
        .with_conn(|conn| file_state::get_token(conn, "/keeper/d.txt"))
        .unwrap()
        .is_none());
    assert!(store
        .with_conn(|conn| file_state::get_token(conn, "/keep/a.txt"))
        .unwrap()
        .is_some());
    assert!(store
        .with_conn(|conn| file_state::get_token(conn, "/keep/sub/b.txt"))
        .unwrap()
        .is_some());
    assert!(store
        .with_conn(|conn| node_mapping::get(conn, "/keep/a.txt", "/r/a.txt"))
        .unwrap()
        .is_some());
    assert!(store
        .with_conn(|conn| node_mapping::get(conn, "/gone/c.txt", "/r/c.txt"))
        .unwrap()
        .is_none());
}

#[test]
fn cleanup_with_no_roots_removes_everything() {
    let store = Store::open_in_memory().unwrap();
    seed(&store);

    store
        .with_tx(|tx| {
            file_state::delete_outside_roots(tx, &[])?;
            node_mapping::delete_outside_roots(tx, &[])?;
            Ok(())
        })
        .unwrap();

    assert_eq!(store.with_conn(file_state::count).unwrap(), 0);
    assert_eq!(store.with_conn(node_mapping::count).unwrap(), 0);
}
