//! Deltas and per-transaction diffs
//!
//! A [`Delta`] is the value vector stored against a [`StatKey`]. Values
//! combine by elementwise addition, so applying the same set of deltas in
//! any order gives the same result. A [`Diff`] is everything one
//! transaction contributes.

use std::collections::btree_map;
use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::error::Result;
use crate::key::StatKey;

/// Fixed-length vector of signed counters
///
/// Every arity the store uses fits inline, so deltas never allocate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Delta(SmallVec<[i64; 2]>);

impl Delta {
    /// Delta from arbitrary values
    pub fn new(values: impl IntoIterator<Item = i64>) -> Self {
        Delta(values.into_iter().collect())
    }

    /// Arity-1 delta (node and relationship counts)
    pub fn single(value: i64) -> Self {
        Delta(SmallVec::from_buf_and_len([value, 0], 1))
    }

    /// Arity-2 delta (index statistics and samples)
    pub fn pair(first: i64, second: i64) -> Self {
        Delta(SmallVec::from_buf([first, second]))
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no values
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value at `index`
    pub fn get(&self, index: usize) -> Option<i64> {
        self.0.get(index).copied()
    }

    /// All values
    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }

    /// Whether every value is zero
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0)
    }

    /// Add `other` into `self`, elementwise
    ///
    /// Callers validate arity first; lengths must match.
    #[inline]
    pub fn merge(&mut self, other: &Delta) {
        debug_assert_eq!(self.len(), other.len(), "delta arity mismatch in merge");
        for (mine, theirs) in self.0.iter_mut().zip(other.0.iter()) {
            *mine = mine.wrapping_add(*theirs);
        }
    }
}

impl From<i64> for Delta {
    fn from(value: i64) -> Self {
        Delta::single(value)
    }
}

impl From<(i64, i64)> for Delta {
    fn from((first, second): (i64, i64)) -> Self {
        Delta::pair(first, second)
    }
}

impl From<Vec<i64>> for Delta {
    fn from(values: Vec<i64>) -> Self {
        Delta(SmallVec::from_vec(values))
    }
}

impl From<&[i64]> for Delta {
    fn from(values: &[i64]) -> Self {
        Delta(SmallVec::from_slice(values))
    }
}

/// The deltas one transaction contributes, keyed by statistic
///
/// Built with [`Diff::add`], which validates and merges repeated keys, or
/// with [`Diff::insert`] / `collect()`, which store deltas as given and
/// leave validation to the apply path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    entries: BTreeMap<StatKey, Delta>,
}

impl Diff {
    /// Create an empty diff
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` for `key`, merging with any delta already present
    pub fn add(&mut self, key: StatKey, delta: Delta) -> Result<()> {
        key.check_delta(&delta)?;
        match self.entries.entry(key) {
            btree_map::Entry::Occupied(mut slot) => slot.get_mut().merge(&delta),
            btree_map::Entry::Vacant(slot) => {
                slot.insert(delta);
            }
        }
        Ok(())
    }

    /// Store `delta` for `key` as given, replacing any previous delta
    pub fn insert(&mut self, key: StatKey, delta: Delta) -> Option<Delta> {
        self.entries.insert(key, delta)
    }

    /// Adjust the node count for `label_id`
    pub fn increment_node_count(&mut self, label_id: i32, delta: i64) {
        self.entries
            .entry(StatKey::node(label_id))
            .and_modify(|d| d.merge(&Delta::single(delta)))
            .or_insert_with(|| Delta::single(delta));
    }

    /// Adjust the relationship count for `(start)-[type]->(end)`
    pub fn increment_relationship_count(
        &mut self,
        start_label_id: i32,
        type_id: i32,
        end_label_id: i32,
        delta: i64,
    ) {
        self.entries
            .entry(StatKey::relationship(start_label_id, type_id, end_label_id))
            .and_modify(|d| d.merge(&Delta::single(delta)))
            .or_insert_with(|| Delta::single(delta));
    }

    /// Delta recorded for `key`
    pub fn get(&self, key: &StatKey) -> Option<&Delta> {
        self.entries.get(key)
    }

    /// Number of keys touched
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the diff touches no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(key, delta)` in key order
    pub fn iter(&self) -> btree_map::Iter<'_, StatKey, Delta> {
        self.entries.iter()
    }

    /// Check every entry against its key's arity
    ///
    /// Fails on the first `Empty` key or arity mismatch.
    pub fn validate(&self) -> Result<()> {
        for (key, delta) in &self.entries {
            key.check_delta(delta)?;
        }
        Ok(())
    }
}

impl FromIterator<(StatKey, Delta)> for Diff {
    fn from_iter<I: IntoIterator<Item = (StatKey, Delta)>>(iter: I) -> Self {
        Diff {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Diff {
    type Item = (&'a StatKey, &'a Delta);
    type IntoIter = btree_map::Iter<'a, StatKey, Delta>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for Diff {
    type Item = (StatKey, Delta);
    type IntoIter = btree_map::IntoIter<StatKey, Delta>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
