//! Snapshot exactness under concurrent, out-of-order application
//!
//! A completed snapshot at id N must equal applying transactions 1..=N
//! sequentially, whatever order and interleaving the workers used.

use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::common::*;
use tally::{AggregateMap, CommitTracker, OutOfOrderCommitTracker, SnapshotCoordinator, TxnId};

fn run_with_concurrent_snapshot(seed: u64, txns: usize, threads: usize, requested: TxnId) {
    let mut rng = StdRng::seed_from_u64(seed);
    let diffs = Arc::new(random_diffs(&mut rng, txns));

    let map = Arc::new(AggregateMap::new());
    let tracker = Arc::new(OutOfOrderCommitTracker::new(0));
    let coordinator = Arc::new(SnapshotCoordinator::new(map.clone(), tracker.clone()));

    let snapshotter = {
        let coordinator = coordinator.clone();
        thread::spawn(move || coordinator.snapshot(requested))
    };

    apply_concurrently(&mut rng, &map, &tracker, &diffs, threads);

    let snapshot = snapshotter.join().unwrap().unwrap();
    let target = snapshot.txn_id();
    assert!(target >= requested);
    assert!(target <= txns as TxnId);
    assert_eq!(snapshot, sequential_snapshot(&diffs, target as usize));

    // Live map saw everything
    assert_eq!(tracker.highest_gap_free(), txns as TxnId);
    assert_eq!(collect(&map, txns as TxnId), sequential_snapshot(&diffs, txns));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn snapshot_equals_sequential_prefix(
        seed in any::<u64>(),
        txns in 1usize..120,
        threads in 1usize..6,
        requested_frac in 0.0f64..=1.0,
    ) {
        let requested = (txns as f64 * requested_frac) as TxnId;
        run_with_concurrent_snapshot(seed, txns, threads, requested);
    }
}

#[test]
fn repeated_snapshots_are_monotonic_and_exact() {
    let mut rng = StdRng::seed_from_u64(7);
    let txns = 400;
    let diffs = Arc::new(random_diffs(&mut rng, txns));

    let map = Arc::new(AggregateMap::new());
    let tracker = Arc::new(OutOfOrderCommitTracker::new(0));
    let coordinator = Arc::new(SnapshotCoordinator::new(map.clone(), tracker.clone()));

    let snapshotter = {
        let coordinator = coordinator.clone();
        let tracker = tracker.clone();
        thread::spawn(move || {
            let mut taken = Vec::new();
            while tracker.highest_gap_free() < txns as TxnId {
                taken.push(coordinator.snapshot(0).unwrap());
            }
            taken
        })
    };

    apply_concurrently(&mut rng, &map, &tracker, &diffs, 4);

    let taken = snapshotter.join().unwrap();
    let mut last = 0;
    for snapshot in &taken {
        assert!(snapshot.txn_id() >= last);
        last = snapshot.txn_id();
        assert_eq!(snapshot, &sequential_snapshot(&diffs, snapshot.txn_id() as usize));
    }
}

#[test]
fn no_partial_transaction_visible() {
    // Every txn adds +1 to two keys; any exact snapshot keeps them equal
    let map = Arc::new(AggregateMap::new());
    let tracker = Arc::new(OutOfOrderCommitTracker::new(0));
    let coordinator = SnapshotCoordinator::new(map.clone(), tracker.clone());
    let txns: TxnId = 2000;

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let map = map.clone();
            let tracker = tracker.clone();
            thread::spawn(move || {
                let mut txn_id = t + 1;
                while txn_id <= txns {
                    let mut diff = node_diff(1, 1);
                    diff.increment_node_count(2, 1);
                    map.update_all(txn_id, &diff).unwrap();
                    tracker.offer(txn_id);
                    txn_id += 4;
                }
            })
        })
        .collect();

    while tracker.highest_gap_free() < txns {
        let snapshot = coordinator.snapshot(0).unwrap();
        let a = snapshot.get(&tally::StatKey::node(1)).cloned();
        let b = snapshot.get(&tally::StatKey::node(2)).cloned();
        assert_eq!(a, b);
        if let Some(a) = a {
            assert_eq!(a.get(0), Some(snapshot.txn_id() as i64));
        }
    }

    for worker in workers {
        worker.join().unwrap();
    }
}
