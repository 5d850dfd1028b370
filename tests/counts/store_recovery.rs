//! Store lifecycle: checkpoint, reopen, corruption

use std::fs;

use tempfile::TempDir;

use crate::common::*;
use tally::checkpoint::{checkpoint_path, CHECKPOINT_TEMP_FILE_NAME};
use tally::{CountsStore, Delta, Error, StatKey, TallyConfig};

#[test]
fn reopen_recovers_counts_and_tracker_origin() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    {
        let store = CountsStore::open(dir.path()).unwrap();
        for txn_id in 1..=10 {
            store.apply(txn_id, &node_diff((txn_id % 3) as i32, 1)).unwrap();
        }
        let info = store.checkpoint().unwrap();
        assert_eq!(info.txn_id, 10);
    }

    let store = CountsStore::open(dir.path()).unwrap();
    assert_eq!(store.txn_id(), 10);
    assert_eq!(store.get(&StatKey::node(0)), Some(Delta::single(3)));
    assert_eq!(store.get(&StatKey::node(1)), Some(Delta::single(4)));
    assert_eq!(store.get(&StatKey::node(2)), Some(Delta::single(3)));

    store.apply(11, &node_diff(0, 1)).unwrap();
    assert_eq!(store.snapshot(11).unwrap().txn_id(), 11);
}

#[test]
fn checkpoint_waits_for_out_of_order_gap() {
    let dir = TempDir::new().unwrap();
    let store = std::sync::Arc::new(CountsStore::open(dir.path()).unwrap());
    store.apply(1, &node_diff(1, 1)).unwrap();
    store.apply(3, &node_diff(1, 1)).unwrap();

    let late = {
        let store = store.clone();
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            store.apply(2, &node_diff(1, 1)).unwrap();
        })
    };

    let info = store.checkpoint().unwrap();
    late.join().unwrap();
    assert_eq!(info.txn_id, 3);

    let loaded = tally::CheckpointReader::read(&info.path).unwrap();
    assert_eq!(loaded.get(&StatKey::node(1)), Some(&Delta::single(3)));
}

#[test]
fn corrupted_checkpoint_refuses_to_open() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    {
        let store = CountsStore::open(dir.path()).unwrap();
        store.apply(1, &node_diff(1, 5)).unwrap();
        store.checkpoint().unwrap();
    }

    let path = checkpoint_path(dir.path());
    let mut data = fs::read(&path).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0x01;
    fs::write(&path, &data).unwrap();

    let err = CountsStore::open(dir.path()).unwrap_err();
    assert!(matches!(err, Error::Corruption(_)));
}

#[test]
fn leftover_temp_file_is_removed_on_open() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CHECKPOINT_TEMP_FILE_NAME), b"half a checkpoint").unwrap();

    let store = CountsStore::open(dir.path()).unwrap();
    assert_eq!(store.txn_id(), 0);
    assert!(!dir.path().join(CHECKPOINT_TEMP_FILE_NAME).exists());
}

#[test]
fn config_file_is_honoured() {
    let dir = TempDir::new().unwrap();
    let config = TallyConfig {
        snapshot_poll_interval_ms: 2,
        snapshot_max_wait_ms: Some(15),
        initial_capacity: 16,
    };
    drop(CountsStore::open_with_config(dir.path(), config.clone()).unwrap());

    let store = CountsStore::open(dir.path()).unwrap();
    assert_eq!(store.config(), &config);

    store.apply(2, &node_diff(1, 1)).unwrap();
    assert!(matches!(
        store.snapshot(0),
        Err(Error::SnapshotTimedOut { target: 2, .. })
    ));
}

#[test]
fn invalid_config_file_refuses_to_open() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(tally::CONFIG_FILE_NAME),
        "snapshot_poll_interval_ms = 0\n",
    )
    .unwrap();
    assert!(matches!(
        CountsStore::open(dir.path()),
        Err(Error::Config(_))
    ));
}
