//! Snapshot coordinator
//!
//! Produces exact point-in-time [`CountsSnapshot`]s of an [`AggregateMap`]
//! while transactions keep applying, possibly out of id order.
//!
//! # Protocol
//!
//! ```text
//!            snapshot(min)
//!   Idle ──────────────────────► Pending(target)
//!    ▲   publish: exclusive mode,            │
//!    │   deep copy tagged target             │ appliers with txn <= target
//!    │                                       │ double-write into the copy
//!    │   take: exclusive mode                │
//!    └───────────────────────────────────────┘
//!          once gap-free watermark >= target
//! ```
//!
//! When the watermark reaches `target`, every transaction with id <= target
//! has been offered, and the pipeline only offers after `update_all`
//! returns. Each such transaction either finished before the copy (so the
//! copy holds it) or applied after publication (so it double-wrote).
//!
//! # Liveness
//!
//! By default the wait has no timeout: if an apply thread stalls before
//! offering its id, `snapshot` blocks until it does. Use
//! [`SnapshotConfig::max_wait`] or [`SnapshotCoordinator::interrupt`] to
//! bound it. Either way the coordinator returns to Idle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tally_core::{CountsSnapshot, Error, Result, TxnId};
use tracing::{debug, warn};

use crate::aggregate::AggregateMap;
use crate::tracker::CommitTracker;

/// Snapshot wait tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotConfig {
    /// Sleep between watermark checks once the yield budget is spent (default: 1ms)
    pub poll_interval: Duration,
    /// Watermark checks that yield instead of sleeping (default: 16)
    pub spin_yields: u32,
    /// Give up after this long (default: wait forever)
    pub max_wait: Option<Duration>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig {
            poll_interval: Duration::from_millis(1),
            spin_yields: 16,
            max_wait: None,
        }
    }
}

impl SnapshotConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set poll interval (builder pattern)
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set yield budget (builder pattern)
    pub fn with_spin_yields(mut self, spin_yields: u32) -> Self {
        self.spin_yields = spin_yields;
        self
    }

    /// Bound the wait (builder pattern)
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }
}

/// Builds exact snapshots of an [`AggregateMap`]
///
/// At most one snapshot may be pending per map; a concurrent second request
/// fails with [`Error::SnapshotInProgress`] and leaves the first untouched.
pub struct SnapshotCoordinator {
    map: Arc<AggregateMap>,
    tracker: Arc<dyn CommitTracker>,
    config: SnapshotConfig,
    interrupted: AtomicBool,
}

impl SnapshotCoordinator {
    /// Coordinator with default wait tuning
    pub fn new(map: Arc<AggregateMap>, tracker: Arc<dyn CommitTracker>) -> Self {
        Self::with_config(map, tracker, SnapshotConfig::default())
    }

    /// Coordinator with explicit wait tuning
    pub fn with_config(
        map: Arc<AggregateMap>,
        tracker: Arc<dyn CommitTracker>,
        config: SnapshotConfig,
    ) -> Self {
        SnapshotCoordinator {
            map,
            tracker,
            config,
            interrupted: AtomicBool::new(false),
        }
    }

    /// The map this coordinator snapshots
    pub fn map(&self) -> &Arc<AggregateMap> {
        &self.map
    }

    /// The commit tracker consulted for watermarks
    pub fn tracker(&self) -> &Arc<dyn CommitTracker> {
        &self.tracker
    }

    /// Wait tuning in use
    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Whether a snapshot is currently pending on the map
    pub fn is_pending(&self) -> bool {
        self.map.has_pending_snapshot()
    }

    /// Build an exact snapshot covering at least `min_txn_id`
    ///
    /// The snapshot's id is `max(min_txn_id, highest id seen by the tracker,
    /// highest id applied to the map)`. Blocks the calling thread (never the
    /// appliers) until every transaction up to that id has been offered.
    ///
    /// # Errors
    ///
    /// - [`Error::SnapshotInProgress`] if another snapshot is pending
    /// - [`Error::SnapshotInterrupted`] if [`interrupt`](Self::interrupt) fired during the wait
    /// - [`Error::SnapshotTimedOut`] if [`SnapshotConfig::max_wait`] elapsed
    pub fn snapshot(&self, min_txn_id: TxnId) -> Result<CountsSnapshot> {
        let target = match self.map.publish_pending(min_txn_id, self.tracker.as_ref()) {
            Ok(target) => target,
            Err(e) => {
                warn!(min_txn_id, error = %e, "Snapshot request rejected");
                return Err(e);
            }
        };

        if let Err(e) = self.await_watermark(target) {
            self.map.abandon_pending();
            warn!(target, error = %e, "Snapshot abandoned");
            return Err(e);
        }

        let (taken, entries) = self.map.take_pending().ok_or_else(|| {
            Error::InvalidOperation(format!(
                "pending snapshot for txn {} disappeared before completion",
                target
            ))
        })?;
        debug_assert_eq!(taken, target);

        debug!(target, entries = entries.len(), "Counts snapshot complete");
        Ok(CountsSnapshot::new(target, entries))
    }

    /// Ask a waiting [`snapshot`](Self::snapshot) to give up
    ///
    /// Observing the flag does not lower it: after a snapshot fails with
    /// [`Error::SnapshotInterrupted`] the interrupt is still raised, and every
    /// later snapshot that has to wait fails the same way. Snapshots whose
    /// watermark is already satisfied complete regardless. Lower it with
    /// [`clear_interrupt`](Self::clear_interrupt).
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    /// Lower a pending interrupt. Returns whether one was raised.
    pub fn clear_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::AcqRel)
    }

    /// Whether an interrupt is raised
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    fn await_watermark(&self, target: TxnId) -> Result<()> {
        let started = Instant::now();
        let mut yields = 0u32;

        loop {
            let watermark = self.tracker.highest_gap_free();
            if watermark >= target {
                return Ok(());
            }

            if self.interrupted.load(Ordering::Acquire) {
                return Err(Error::SnapshotInterrupted { target });
            }

            if let Some(max_wait) = self.config.max_wait {
                let waited = started.elapsed();
                if waited >= max_wait {
                    return Err(Error::SnapshotTimedOut {
                        target,
                        watermark,
                        waited,
                    });
                }
            }

            if yields < self.config.spin_yields {
                yields += 1;
                thread::yield_now();
            } else {
                thread::sleep(self.config.poll_interval);
            }
        }
    }
}

impl std::fmt::Debug for SnapshotCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCoordinator")
            .field("map", &self.map)
            .field("gap_free", &self.tracker.highest_gap_free())
            .field("config", &self.config)
            .finish()
    }
}
