//! Concurrency layer for Tally
//!
//! This crate implements the concurrent half of the counts store:
//! - CommitTracker: Which transaction ids have finished applying, and the
//!   highest gap-free id among them
//! - AggregateMap: Concurrent per-key merge of transaction diffs
//! - SnapshotCoordinator: Exact point-in-time snapshots of the map while
//!   transactions keep applying, possibly out of order
//!
//! # Snapshot protocol
//!
//! ```text
//! snapshot(min)
//!   1. exclusive: target = max(min, highest seen, highest applied)
//!                 pending = deep copy of live map, tagged target
//!   2. appliers:  update_all(txn <= target) writes live map AND pending
//!   3. wait:      until tracker gap-free watermark >= target
//!   4. exclusive: take pending -> CountsSnapshot(target, pending)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod coordinator;
pub mod tracker;

pub use aggregate::AggregateMap;
pub use coordinator::{SnapshotConfig, SnapshotCoordinator};
pub use tracker::{CommitTracker, OutOfOrderCommitTracker, TrackerSnapshot};
