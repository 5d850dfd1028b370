//! Out-of-order commit tracking
//!
//! Transaction apply work can be pipelined, so ids finish in a different
//! order than they were handed out. Consumers that need a safe boundary
//! (snapshotting, recovery) want the highest id below which nothing is still
//! outstanding, not merely the last id that finished.
//!
//! ```text
//! origin = 10
//! offered: 11 12 14 15
//!                 ^ gap at 13
//! highest_gap_free  = 12
//! highest_ever_seen = 15
//! out_of_order      = [14, 15]
//! ```

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tally_core::TxnId;
use tracing::{debug, warn};

/// Tracks which transactions have finished applying
///
/// The commit pipeline calls [`offer`](CommitTracker::offer) exactly once
/// per transaction, after the transaction's diff is fully applied.
pub trait CommitTracker: Send + Sync {
    /// Record that `txn_id` finished applying
    ///
    /// Returns true when the gap-free watermark advanced.
    fn offer(&self, txn_id: TxnId) -> bool;

    /// Largest id `w` such that every id from the origin through `w` was offered
    fn highest_gap_free(&self) -> TxnId;

    /// Largest id ever offered, including ids beyond a gap
    fn highest_ever_seen(&self) -> TxnId;
}

/// Persistable state of an [`OutOfOrderCommitTracker`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackerSnapshot {
    /// Gap-free watermark
    pub highest_gap_free: TxnId,
    /// Ids offered beyond the first gap, ascending
    pub out_of_order: Vec<TxnId>,
}

#[derive(Debug)]
struct TrackerState {
    gap_free: TxnId,
    out_of_order: BTreeSet<TxnId>,
}

/// In-memory [`CommitTracker`]
///
/// Offers take a short mutex; watermark reads are lock-free atomics so a
/// waiting snapshot can poll without contending with appliers.
#[derive(Debug)]
pub struct OutOfOrderCommitTracker {
    state: Mutex<TrackerState>,
    /// Mirror of `state.gap_free`, written under the mutex
    gap_free: AtomicU64,
    /// Highest id ever offered, written under the mutex
    highest: AtomicU64,
}

impl OutOfOrderCommitTracker {
    /// Tracker whose gap-free watermark starts at `origin`
    ///
    /// `origin` is typically the transaction id of the snapshot the store
    /// was recovered from; the next expected id is `origin + 1`.
    pub fn new(origin: TxnId) -> Self {
        OutOfOrderCommitTracker {
            state: Mutex::new(TrackerState {
                gap_free: origin,
                out_of_order: BTreeSet::new(),
            }),
            gap_free: AtomicU64::new(origin),
            highest: AtomicU64::new(origin),
        }
    }

    /// Restore a tracker from its persisted state
    pub fn with_out_of_order(
        origin: TxnId,
        out_of_order: impl IntoIterator<Item = TxnId>,
    ) -> Self {
        let tracker = Self::new(origin);
        for txn_id in out_of_order {
            tracker.offer(txn_id);
        }
        tracker
    }

    /// Current state, suitable for persisting next to a checkpoint
    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.state.lock();
        TrackerSnapshot {
            highest_gap_free: state.gap_free,
            out_of_order: state.out_of_order.iter().copied().collect(),
        }
    }

    /// Forget everything and restart at `origin`
    pub fn reset(&self, origin: TxnId) {
        let mut state = self.state.lock();
        state.gap_free = origin;
        state.out_of_order.clear();
        self.gap_free.store(origin, Ordering::Release);
        self.highest.store(origin, Ordering::Release);
    }

    /// Number of ids offered beyond the first gap
    pub fn out_of_order_len(&self) -> usize {
        self.state.lock().out_of_order.len()
    }
}

impl Default for OutOfOrderCommitTracker {
    fn default() -> Self {
        Self::new(0)
    }
}

impl CommitTracker for OutOfOrderCommitTracker {
    fn offer(&self, txn_id: TxnId) -> bool {
        let mut state = self.state.lock();

        if txn_id <= state.gap_free {
            warn!(
                txn_id,
                gap_free = state.gap_free,
                "Ignoring offer at or below the gap-free watermark"
            );
            return false;
        }

        if txn_id != state.gap_free + 1 {
            if !state.out_of_order.insert(txn_id) {
                warn!(txn_id, "Ignoring duplicate offer");
                return false;
            }
            self.highest.fetch_max(txn_id, Ordering::AcqRel);
            return false;
        }

        state.gap_free = txn_id;
        while let Some(&next) = state.out_of_order.first() {
            if next != state.gap_free + 1 {
                break;
            }
            state.out_of_order.pop_first();
            state.gap_free = next;
        }

        self.highest.fetch_max(txn_id, Ordering::AcqRel);
        self.gap_free.store(state.gap_free, Ordering::Release);
        debug!(
            txn_id,
            gap_free = state.gap_free,
            pending = state.out_of_order.len(),
            "Gap-free watermark advanced"
        );
        true
    }

    fn highest_gap_free(&self) -> TxnId {
        self.gap_free.load(Ordering::Acquire)
    }

    fn highest_ever_seen(&self) -> TxnId {
        self.highest.load(Ordering::Acquire)
    }
}
