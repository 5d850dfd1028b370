//! Shared test utilities for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tally::{
    AggregateMap, CommitTracker, CountsSnapshot, Delta, Diff, OutOfOrderCommitTracker, StatKey,
    TxnId,
};

// ============================================================================
// Initialization
// ============================================================================

/// Route library logs to the test harness output (idempotent)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

// ============================================================================
// Diff builders
// ============================================================================

/// Diff adding `n` nodes with `label`
pub fn node_diff(label: i32, n: i64) -> Diff {
    let mut diff = Diff::new();
    diff.increment_node_count(label, n);
    diff
}

/// Random diff over a small key space, so transactions collide on keys
pub fn random_diff<R: Rng>(rng: &mut R) -> Diff {
    let mut diff = Diff::new();
    for _ in 0..rng.gen_range(1..=4) {
        match rng.gen_range(0..4) {
            0 => diff.increment_node_count(rng.gen_range(0..4), rng.gen_range(-5..=5)),
            1 => diff.increment_relationship_count(
                rng.gen_range(0..3),
                rng.gen_range(0..2),
                rng.gen_range(0..3),
                rng.gen_range(-5..=5),
            ),
            2 => {
                let key = StatKey::index_statistics(rng.gen_range(0..3), 1);
                diff.add(key, Delta::pair(rng.gen_range(0..10), rng.gen_range(0..10)))
                    .unwrap();
            }
            _ => {
                let key = StatKey::index_sample(rng.gen_range(0..3), 1);
                diff.add(key, Delta::pair(rng.gen_range(0..10), rng.gen_range(0..10)))
                    .unwrap();
            }
        }
    }
    diff
}

/// `count` random diffs; index `i` belongs to txn `i + 1`
pub fn random_diffs<R: Rng>(rng: &mut R, count: usize) -> Vec<Diff> {
    (0..count).map(|_| random_diff(rng)).collect()
}

// ============================================================================
// Reference model
// ============================================================================

/// Apply `diffs[..upto]` sequentially, in txn order, into a snapshot at `upto`
pub fn sequential_snapshot(diffs: &[Diff], upto: usize) -> CountsSnapshot {
    let map = AggregateMap::new();
    for (i, diff) in diffs.iter().take(upto).enumerate() {
        map.update_all(i as TxnId + 1, diff).unwrap();
    }
    collect(&map, upto as TxnId)
}

/// Copy a live map into a snapshot tagged `txn_id`
pub fn collect(map: &AggregateMap, txn_id: TxnId) -> CountsSnapshot {
    let mut entries = Vec::new();
    map.visit_all(|key, delta| entries.push((*key, delta.clone())));
    CountsSnapshot::try_from_entries(txn_id, entries).unwrap()
}

/// Apply and offer `ids` on `threads` workers, each taking ids round-robin
/// from a shuffled order
pub fn apply_concurrently<R: Rng>(
    rng: &mut R,
    map: &Arc<AggregateMap>,
    tracker: &Arc<OutOfOrderCommitTracker>,
    diffs: &Arc<Vec<Diff>>,
    threads: usize,
) {
    let mut order: Vec<usize> = (0..diffs.len()).collect();
    order.shuffle(rng);

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let mine: Vec<usize> = order.iter().copied().skip(t).step_by(threads).collect();
            let map = map.clone();
            let tracker = tracker.clone();
            let diffs = diffs.clone();
            std::thread::spawn(move || {
                for i in mine {
                    let txn_id = i as TxnId + 1;
                    map.update_all(txn_id, &diffs[i]).unwrap();
                    tracker.offer(txn_id);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
