//! Point-in-time counts snapshots
//!
//! A [`CountsSnapshot`] is an immutable, deep copy of every statistic as of
//! transaction `txn_id`: all transactions with id <= `txn_id` are reflected,
//! none partially, and nothing newer.

use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::delta::Delta;
use crate::error::Result;
use crate::key::StatKey;
use crate::TxnId;

/// Immutable snapshot of the aggregate map
///
/// Entries are kept in key order so encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountsSnapshot {
    txn_id: TxnId,
    entries: BTreeMap<StatKey, Delta>,
}

impl CountsSnapshot {
    /// Take ownership of `entries` as the snapshot at `txn_id`, unchecked
    ///
    /// Meant for the snapshot coordinator and the codec, whose entries are
    /// already validated. Other callers should use
    /// [`try_from_entries`](Self::try_from_entries), which rejects `Empty`
    /// keys and arity mismatches.
    pub fn new(txn_id: TxnId, entries: BTreeMap<StatKey, Delta>) -> Self {
        CountsSnapshot { txn_id, entries }
    }

    /// Build a snapshot, rejecting `Empty` keys and arity mismatches
    pub fn try_from_entries(
        txn_id: TxnId,
        entries: impl IntoIterator<Item = (StatKey, Delta)>,
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        for (key, delta) in entries {
            key.check_delta(&delta)?;
            map.insert(key, delta);
        }
        Ok(CountsSnapshot::new(txn_id, map))
    }

    /// Snapshot with no statistics
    pub fn empty(txn_id: TxnId) -> Self {
        CountsSnapshot::new(txn_id, BTreeMap::new())
    }

    /// Highest transaction id reflected by this snapshot
    pub fn txn_id(&self) -> TxnId {
        self.txn_id
    }

    /// Values for `key`
    pub fn get(&self, key: &StatKey) -> Option<&Delta> {
        self.entries.get(key)
    }

    /// Number of statistics
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot holds no statistics
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(key, values)` in key order
    pub fn iter(&self) -> btree_map::Iter<'_, StatKey, Delta> {
        self.entries.iter()
    }

    /// Give up the snapshot, keeping its entries
    pub fn into_entries(self) -> BTreeMap<StatKey, Delta> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a CountsSnapshot {
    type Item = (&'a StatKey, &'a Delta);
    type IntoIter = btree_map::Iter<'a, StatKey, Delta>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
