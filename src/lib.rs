//! Tally - snapshot-isolated aggregate counts for a transactional graph database
//!
//! Tally keeps per-label node counts, per-pattern relationship counts and
//! index statistics up to date as transactions commit, possibly out of
//! transaction-id order, and produces exact point-in-time snapshots of them.
//!
//! # Quick Start
//!
//! ```ignore
//! use tally::{CountsStore, Diff, StatKey};
//!
//! let store = CountsStore::ephemeral();
//!
//! let mut diff = Diff::new();
//! diff.increment_node_count(1, 10);
//! store.apply(1, &diff)?;
//!
//! let snapshot = store.snapshot(1)?;
//! let bytes = tally::codec::encode_to_vec(&snapshot)?;
//! ```
//!
//! # Architecture
//!
//! - `tally-core`: keys, deltas, diffs, snapshots, errors
//! - `tally-concurrency`: aggregate map, commit tracker, snapshot coordinator
//! - `tally-durability`: wire codec and checkpoint files
//! - `tally-engine`: the [`CountsStore`] facade and `tally.toml`

pub use tally_concurrency::{
    AggregateMap, CommitTracker, OutOfOrderCommitTracker, SnapshotConfig, SnapshotCoordinator,
    TrackerSnapshot,
};
pub use tally_core::*;
pub use tally_durability::{checkpoint, codec, CheckpointInfo, CheckpointReader, CheckpointWriter};
pub use tally_engine::{CountsStore, TallyConfig, CONFIG_FILE_NAME};
