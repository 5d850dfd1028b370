//! Concurrent aggregate map
//!
//! Maps each [`StatKey`] to its running [`Delta`]. Many transaction-apply
//! threads merge diffs at once; a snapshot coordinator can publish a pending
//! buffer that receives a second copy of every diff it might have missed.
//!
//! # Locking
//!
//! - Per-key merges go through DashMap's entry API, which locks only the
//!   target shard. Merges on the same key serialize; merges on different
//!   keys run in parallel.
//! - `coordination` is a reader-writer lock around the pending-snapshot
//!   slot. `update_all` holds the shared mode for the whole call, so a diff
//!   is never half-applied when the coordinator takes the exclusive mode to
//!   copy the map or take the buffer.
//! - Reads (`get`, `visit_all`) take neither the coordination lock nor
//!   anything but shard read locks.

use std::collections::BTreeMap;
use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxHasher;
use tally_core::{CountsSnapshot, Delta, Diff, Error, Result, StatKey, TxnId};
use tracing::debug;

use crate::tracker::CommitTracker;

type FxBuildHasher = BuildHasherDefault<FxHasher>;
type Entries = DashMap<StatKey, Delta, FxBuildHasher>;

/// In-progress snapshot copy receiving double-writes
struct PendingSnapshot {
    target: TxnId,
    buffer: Entries,
}

/// Concurrent mapping from statistic key to aggregated values
///
/// Constructed explicitly (empty, or seeded from a recovered snapshot) and
/// shared by `Arc` with the apply pipeline and the snapshot coordinator.
pub struct AggregateMap {
    entries: Entries,
    coordination: RwLock<Option<PendingSnapshot>>,
    /// Highest id that entered `update_all`, or the seed snapshot's id
    highest_applied: AtomicU64,
}

impl AggregateMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty map sized for `capacity` keys
    pub fn with_capacity(capacity: usize) -> Self {
        AggregateMap {
            entries: DashMap::with_capacity_and_hasher(capacity, FxBuildHasher::default()),
            coordination: RwLock::new(None),
            highest_applied: AtomicU64::new(0),
        }
    }

    /// Create a map holding `entries` as of `txn_id`
    pub fn with_entries<'a>(
        txn_id: TxnId,
        entries: impl IntoIterator<Item = (&'a StatKey, &'a Delta)>,
    ) -> Result<Self> {
        let map = Self::new();
        for (key, delta) in entries {
            key.check_delta(delta)?;
            map.entries.insert(*key, delta.clone());
        }
        map.highest_applied.store(txn_id, Ordering::Release);
        Ok(map)
    }

    /// Create a map holding exactly the contents of `snapshot`
    pub fn from_snapshot(snapshot: &CountsSnapshot) -> Result<Self> {
        Self::with_entries(snapshot.txn_id(), snapshot.iter())
    }

    /// Current values for `key`
    ///
    /// Reflects some prefix of the diffs applied to `key`. There is no
    /// atomicity across keys.
    pub fn get(&self, key: &StatKey) -> Option<Delta> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Merge one transaction's diff
    ///
    /// Every delta is validated before anything is applied; on an `Empty`
    /// key or arity mismatch the whole diff is rejected and the map is
    /// unchanged. While a snapshot with target >= `txn_id` is pending, the
    /// diff is applied to the pending buffer as well.
    pub fn update_all(&self, txn_id: TxnId, diff: &Diff) -> Result<()> {
        diff.validate()?;

        let pending = self.coordination.read();
        self.highest_applied.fetch_max(txn_id, Ordering::AcqRel);

        for (key, delta) in diff {
            merge_into(&self.entries, *key, delta);
        }

        if let Some(pending) = pending.as_ref() {
            if txn_id <= pending.target {
                for (key, delta) in diff {
                    merge_into(&pending.buffer, *key, delta);
                }
            }
        }
        Ok(())
    }

    /// Number of keys stored
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Visit every `(key, values)` currently stored
    ///
    /// Order is unspecified. Each entry is seen in a per-key consistent
    /// state. The visitor must not call back into this map's writers.
    pub fn visit_all<F>(&self, mut visitor: F)
    where
        F: FnMut(&StatKey, &Delta),
    {
        for entry in self.entries.iter() {
            visitor(entry.key(), entry.value());
        }
    }

    /// Highest transaction id that has started applying to this map
    pub fn highest_applied_txn_id(&self) -> TxnId {
        self.highest_applied.load(Ordering::Acquire)
    }

    /// Whether a snapshot buffer is currently published
    pub fn has_pending_snapshot(&self) -> bool {
        self.coordination.read().is_some()
    }

    /// Target of the published snapshot buffer, if any
    pub fn pending_target(&self) -> Option<TxnId> {
        self.coordination.read().as_ref().map(|p| p.target)
    }

    /// Publish a pending snapshot buffer (Idle -> Pending)
    ///
    /// Under the exclusive mode: picks the target, deep-copies the live
    /// entries and publishes the copy. No `update_all` is in progress while
    /// this runs, so every applied id is <= the chosen target.
    pub(crate) fn publish_pending(
        &self,
        requested: TxnId,
        tracker: &dyn CommitTracker,
    ) -> Result<TxnId> {
        let mut slot = self.coordination.write();
        if let Some(pending) = slot.as_ref() {
            return Err(Error::SnapshotInProgress {
                target: pending.target,
            });
        }

        let target = requested
            .max(tracker.highest_ever_seen())
            .max(self.highest_applied.load(Ordering::Acquire));
        let buffer: Entries = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        debug!(
            requested,
            target,
            entries = buffer.len(),
            "Published pending counts snapshot"
        );
        *slot = Some(PendingSnapshot { target, buffer });
        Ok(target)
    }

    /// Take the pending buffer (Pending -> Idle)
    pub(crate) fn take_pending(&self) -> Option<(TxnId, BTreeMap<StatKey, Delta>)> {
        let pending = self.coordination.write().take()?;
        let entries: BTreeMap<StatKey, Delta> = pending.buffer.into_iter().collect();
        debug!(
            target = pending.target,
            entries = entries.len(),
            "Took pending counts snapshot"
        );
        Some((pending.target, entries))
    }

    /// Drop the pending buffer without producing a snapshot
    pub(crate) fn abandon_pending(&self) {
        if let Some(pending) = self.coordination.write().take() {
            debug!(target = pending.target, "Abandoned pending counts snapshot");
        }
    }
}

impl Default for AggregateMap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AggregateMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateMap")
            .field("len", &self.entries.len())
            .field("highest_applied", &self.highest_applied_txn_id())
            .field("pending_target", &self.pending_target())
            .finish()
    }
}

/// Upsert-with-merge: seed fresh keys from the delta, add into existing ones
#[inline]
fn merge_into(entries: &Entries, key: StatKey, delta: &Delta) {
    entries
        .entry(key)
        .and_modify(|current| current.merge(delta))
        .or_insert_with(|| delta.clone());
}
