//! Reference scenarios
//!
//! Small end-to-end walkthroughs of the store's contract.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::common::*;
use tally::{
    codec, AggregateMap, CommitTracker, CountsSnapshot, Delta, Diff, Error, OutOfOrderCommitTracker,
    SnapshotCoordinator, StatKey,
};

fn setup() -> (Arc<AggregateMap>, Arc<OutOfOrderCommitTracker>, Arc<SnapshotCoordinator>) {
    let map = Arc::new(AggregateMap::new());
    let tracker = Arc::new(OutOfOrderCommitTracker::new(0));
    let coordinator = Arc::new(SnapshotCoordinator::new(map.clone(), tracker.clone()));
    (map, tracker, coordinator)
}

// ============================================================================
// Live reads
// ============================================================================

#[test]
fn get_after_single_update() {
    let (map, _, _) = setup();
    map.update_all(1, &node_diff(5, 3)).unwrap();

    assert_eq!(map.get(&StatKey::node(5)), Some(Delta::single(3)));
    assert_eq!(map.get(&StatKey::node(6)), None);
}

#[test]
fn deltas_accumulate() {
    let (map, _, _) = setup();
    map.update_all(1, &node_diff(5, 3)).unwrap();
    map.update_all(2, &node_diff(5, -1)).unwrap();

    assert_eq!(map.get(&StatKey::node(5)), Some(Delta::single(2)));
}

#[test]
fn arity_mismatch_applies_nothing() {
    let (map, _, _) = setup();
    let mut diff = Diff::new();
    diff.increment_node_count(1, 1);
    diff.insert(StatKey::index_sample(1, 1), Delta::single(4));

    let err = map.update_all(1, &diff).unwrap_err();
    assert!(matches!(
        err,
        Error::ArityMismatch {
            expected: 2,
            actual: 1,
            ..
        }
    ));
    assert!(err.is_contract_violation());
    assert!(map.is_empty());
}

// ============================================================================
// Snapshots
// ============================================================================

#[test]
fn out_of_order_snapshot_waits_for_missing_txn() {
    let (map, tracker, coordinator) = setup();
    map.update_all(1, &node_diff(1, 1)).unwrap();
    tracker.offer(1);
    map.update_all(3, &node_diff(1, 100)).unwrap();
    tracker.offer(3);

    let waiter = {
        let coordinator = coordinator.clone();
        thread::spawn(move || coordinator.snapshot(3))
    };

    thread::sleep(Duration::from_millis(30));
    assert!(!waiter.is_finished());
    assert!(coordinator.is_pending());

    map.update_all(2, &node_diff(1, 10)).unwrap();
    tracker.offer(2);

    let snapshot = waiter.join().unwrap().unwrap();
    assert_eq!(snapshot.txn_id(), 3);
    assert_eq!(snapshot.get(&StatKey::node(1)), Some(&Delta::single(111)));
    assert!(!coordinator.is_pending());
}

#[test]
fn second_concurrent_snapshot_fails_immediately() {
    let (map, tracker, coordinator) = setup();
    map.update_all(2, &node_diff(1, 1)).unwrap();
    tracker.offer(2);

    let first = {
        let coordinator = coordinator.clone();
        thread::spawn(move || coordinator.snapshot(0))
    };
    while !coordinator.is_pending() {
        thread::yield_now();
    }

    assert!(matches!(
        coordinator.snapshot(0),
        Err(Error::SnapshotInProgress { .. })
    ));

    map.update_all(1, &node_diff(1, 1)).unwrap();
    tracker.offer(1);
    assert_eq!(first.join().unwrap().unwrap().txn_id(), 2);
}

#[test]
fn interrupted_snapshot_leaves_coordinator_idle() {
    let (map, tracker, coordinator) = setup();
    map.update_all(2, &node_diff(1, 1)).unwrap();
    tracker.offer(2);

    let waiter = {
        let coordinator = coordinator.clone();
        thread::spawn(move || coordinator.snapshot(0))
    };
    while !coordinator.is_pending() {
        thread::yield_now();
    }
    coordinator.interrupt();

    assert!(matches!(
        waiter.join().unwrap(),
        Err(Error::SnapshotInterrupted { target: 2 })
    ));
    assert!(!coordinator.is_pending());
    assert!(coordinator.is_interrupted());
    coordinator.clear_interrupt();

    // Later applies no longer double-write anywhere
    map.update_all(1, &node_diff(1, 1)).unwrap();
    tracker.offer(1);
    assert_eq!(
        coordinator.snapshot(0).unwrap().get(&StatKey::node(1)),
        Some(&Delta::single(2))
    );
}

// ============================================================================
// Codec
// ============================================================================

#[test]
fn node_and_index_sample_round_trip() {
    let snapshot = CountsSnapshot::try_from_entries(
        7,
        vec![
            (StatKey::node(3), Delta::single(12)),
            (StatKey::index_sample(4, 9), Delta::pair(5, 100)),
        ],
    )
    .unwrap();

    let bytes = codec::encode_to_vec(&snapshot).unwrap();
    let decoded = codec::decode_from_slice(&bytes).unwrap();
    assert_eq!(decoded, snapshot);
}

#[test]
fn decoding_empty_tag_fails() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1i64.to_be_bytes());
    bytes.extend_from_slice(&1i32.to_be_bytes());
    bytes.push(0);

    assert!(matches!(
        codec::decode_from_slice(&bytes),
        Err(Error::EmptyKey)
    ));
}
