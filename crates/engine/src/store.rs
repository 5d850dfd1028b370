//! Counts store lifecycle
//!
//! [`CountsStore`] ties the pieces together: an [`AggregateMap`] for live
//! counts, an [`OutOfOrderCommitTracker`] fed by the commit pipeline, a
//! [`SnapshotCoordinator`] for exact snapshots, and optionally a data
//! directory holding `tally.toml` and the latest checkpoint.
//!
//! # Flow
//!
//! 1. Create the data directory if needed
//! 2. Read or create `tally.toml`
//! 3. Load the latest checkpoint, if any
//! 4. Seed the map from it and start the tracker at its transaction id

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tally_concurrency::{
    AggregateMap, CommitTracker, OutOfOrderCommitTracker, SnapshotCoordinator,
};
use tally_core::{CountsSnapshot, Delta, Diff, Error, Result, StatKey, TxnId};
use tally_durability::{CheckpointInfo, CheckpointReader, CheckpointWriter};
use tracing::{debug, info};

use crate::config::{TallyConfig, CONFIG_FILE_NAME};

/// Map and coordinator currently serving the store
struct Live {
    map: Arc<AggregateMap>,
    coordinator: Arc<SnapshotCoordinator>,
}

/// Snapshot-isolated aggregate counts store
///
/// All operations take `&self`; share the store across threads with `Arc`.
pub struct CountsStore {
    live: RwLock<Live>,
    tracker: Arc<OutOfOrderCommitTracker>,
    config: TallyConfig,
    data_dir: Option<PathBuf>,
    checkpoints: Option<CheckpointWriter>,
}

impl CountsStore {
    /// Open the store at `path`, recovering from its latest checkpoint
    ///
    /// Reads `tally.toml` from the data directory, creating it with
    /// defaults if it does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        TallyConfig::write_default_if_missing(&config_path)?;
        let config = TallyConfig::from_file(&config_path)?;

        Self::open_at(data_dir, config)
    }

    /// Open the store at `path` with an explicit configuration
    ///
    /// The supplied config is written to `tally.toml` so later
    /// [`open`](Self::open) calls pick up the same settings.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: TallyConfig) -> Result<Self> {
        config.validate()?;
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        config.write_to_file(&data_dir.join(CONFIG_FILE_NAME))?;

        Self::open_at(data_dir, config)
    }

    /// In-memory store with default configuration
    pub fn ephemeral() -> Self {
        let config = TallyConfig::default();
        let map = AggregateMap::with_capacity(config.initial_capacity);
        Self::assemble(config, map, 0, None, None)
    }

    /// In-memory store with an explicit configuration
    pub fn with_config(config: TallyConfig) -> Result<Self> {
        config.validate()?;
        let map = AggregateMap::with_capacity(config.initial_capacity);
        Ok(Self::assemble(config, map, 0, None, None))
    }

    fn open_at(data_dir: PathBuf, config: TallyConfig) -> Result<Self> {
        let writer = CheckpointWriter::new(&data_dir)?;
        writer.cleanup_temp_file()?;

        let (map, origin) = match CheckpointReader::load_latest(&data_dir)? {
            Some(snapshot) => {
                info!(
                    txn_id = snapshot.txn_id(),
                    entries = snapshot.len(),
                    path = %data_dir.display(),
                    "Counts store recovered"
                );
                (AggregateMap::from_snapshot(&snapshot)?, snapshot.txn_id())
            }
            None => {
                debug!(path = %data_dir.display(), "Opening empty counts store");
                (AggregateMap::with_capacity(config.initial_capacity), 0)
            }
        };

        Ok(Self::assemble(config, map, origin, Some(data_dir), Some(writer)))
    }

    fn assemble(
        config: TallyConfig,
        map: AggregateMap,
        origin: TxnId,
        data_dir: Option<PathBuf>,
        checkpoints: Option<CheckpointWriter>,
    ) -> Self {
        let map = Arc::new(map);
        let tracker = Arc::new(OutOfOrderCommitTracker::new(origin));
        let coordinator = SnapshotCoordinator::with_config(
            map.clone(),
            tracker.clone(),
            config.snapshot_config(),
        );

        CountsStore {
            live: RwLock::new(Live {
                map,
                coordinator: Arc::new(coordinator),
            }),
            tracker,
            config,
            data_dir,
            checkpoints,
        }
    }

    /// Apply one committed transaction and report it to the tracker
    ///
    /// Each id must be applied exactly once. On a rejected diff nothing is
    /// applied and the id is not offered.
    pub fn apply(&self, txn_id: TxnId, diff: &Diff) -> Result<()> {
        let live = self.live.read();
        live.map.update_all(txn_id, diff)?;
        self.tracker.offer(txn_id);
        Ok(())
    }

    /// Current values for `key`
    pub fn get(&self, key: &StatKey) -> Option<Delta> {
        self.live.read().map.get(key)
    }

    /// Highest transaction id below which no id is missing
    pub fn txn_id(&self) -> TxnId {
        self.tracker.highest_gap_free()
    }

    /// Visit every stored `(key, values)`; order is unspecified
    pub fn visit_all<F>(&self, visitor: F)
    where
        F: FnMut(&StatKey, &Delta),
    {
        let map = self.live.read().map.clone();
        map.visit_all(visitor)
    }

    /// Number of statistic keys stored
    pub fn len(&self) -> usize {
        self.live.read().map.len()
    }

    /// Whether no statistic keys are stored
    pub fn is_empty(&self) -> bool {
        self.live.read().map.is_empty()
    }

    /// Exact snapshot covering at least `min_txn_id`
    ///
    /// See [`SnapshotCoordinator::snapshot`].
    pub fn snapshot(&self, min_txn_id: TxnId) -> Result<CountsSnapshot> {
        let coordinator = self.live.read().coordinator.clone();
        coordinator.snapshot(min_txn_id)
    }

    /// Ask a waiting [`snapshot`](Self::snapshot) to give up
    ///
    /// The interrupt stays raised after the failure; see
    /// [`SnapshotCoordinator::interrupt`].
    pub fn interrupt_snapshot(&self) {
        self.live.read().coordinator.interrupt();
    }

    /// Lower a raised snapshot interrupt. Returns whether one was raised.
    pub fn clear_snapshot_interrupt(&self) -> bool {
        self.live.read().coordinator.clear_interrupt()
    }

    /// Snapshot everything offered so far and persist it
    ///
    /// Fails with [`Error::InvalidOperation`] on an ephemeral store.
    pub fn checkpoint(&self) -> Result<CheckpointInfo> {
        let writer = self.checkpoints.as_ref().ok_or_else(|| {
            Error::InvalidOperation("cannot checkpoint an ephemeral counts store".to_string())
        })?;
        let snapshot = self.snapshot(self.tracker.highest_ever_seen())?;
        writer.write(&snapshot)
    }

    /// Replace all counts with the latest checkpoint
    ///
    /// Must not race with [`apply`](Self::apply) or a pending snapshot.
    /// Without a checkpoint the store is reset to empty at txn 0.
    pub fn reload(&self) -> Result<TxnId> {
        let dir = self.data_dir.as_ref().ok_or_else(|| {
            Error::InvalidOperation("cannot reload an ephemeral counts store".to_string())
        })?;
        let snapshot = CheckpointReader::load_latest(dir)?
            .unwrap_or_else(|| CountsSnapshot::empty(0));
        let txn_id = snapshot.txn_id();

        let map = Arc::new(AggregateMap::from_snapshot(&snapshot)?);
        let mut live = self.live.write();
        if live.map.has_pending_snapshot() {
            return Err(Error::InvalidOperation(
                "cannot reload while a snapshot is pending".to_string(),
            ));
        }
        self.tracker.reset(txn_id);
        *live = Live {
            coordinator: Arc::new(self.coordinator_for(map.clone())),
            map,
        };

        info!(txn_id, entries = snapshot.len(), "Counts store reloaded");
        Ok(txn_id)
    }

    /// Configuration in use
    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    /// Data directory, `None` for ephemeral stores
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Whether the store has no data directory
    pub fn is_ephemeral(&self) -> bool {
        self.data_dir.is_none()
    }

    /// Commit tracker fed by [`apply`](Self::apply)
    pub fn tracker(&self) -> &Arc<OutOfOrderCommitTracker> {
        &self.tracker
    }

    fn coordinator_for(&self, map: Arc<AggregateMap>) -> SnapshotCoordinator {
        let tracker: Arc<dyn CommitTracker> = self.tracker.clone();
        SnapshotCoordinator::with_config(map, tracker, self.config.snapshot_config())
    }
}

impl std::fmt::Debug for CountsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountsStore")
            .field("data_dir", &self.data_dir)
            .field("txn_id", &self.txn_id())
            .field("keys", &self.len())
            .field("config", &self.config)
            .finish()
    }
}
