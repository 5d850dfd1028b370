//! Application order does not matter
//!
//! Deltas add, so any interleaving of the same set of diffs leaves the
//! same final map.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::common::*;
use tally::{AggregateMap, OutOfOrderCommitTracker, TxnId};

#[test]
fn shuffled_sequential_orders_agree() {
    let mut rng = StdRng::seed_from_u64(11);
    let diffs = random_diffs(&mut rng, 200);
    let expected = sequential_snapshot(&diffs, diffs.len());

    for _ in 0..10 {
        let mut order: Vec<usize> = (0..diffs.len()).collect();
        order.shuffle(&mut rng);

        let map = AggregateMap::new();
        for i in order {
            map.update_all(i as TxnId + 1, &diffs[i]).unwrap();
        }
        assert_eq!(collect(&map, diffs.len() as TxnId), expected);
    }
}

#[test]
fn concurrent_application_agrees_with_sequential() {
    for seed in 0..8 {
        let mut rng = StdRng::seed_from_u64(seed);
        let diffs = Arc::new(random_diffs(&mut rng, 500));

        let map = Arc::new(AggregateMap::new());
        let tracker = Arc::new(OutOfOrderCommitTracker::new(0));
        apply_concurrently(&mut rng, &map, &tracker, &diffs, 8);

        assert_eq!(
            collect(&map, diffs.len() as TxnId),
            sequential_snapshot(&diffs, diffs.len())
        );
        assert_eq!(map.highest_applied_txn_id(), diffs.len() as TxnId);
    }
}

#[test]
fn counts_wrap_instead_of_panicking() {
    let map = AggregateMap::new();
    map.update_all(1, &node_diff(1, i64::MAX)).unwrap();
    map.update_all(2, &node_diff(1, 1)).unwrap();
    assert_eq!(
        map.get(&tally::StatKey::node(1)),
        Some(tally::Delta::single(i64::MIN))
    );
}
