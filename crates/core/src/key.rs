//! Statistic keys
//!
//! A [`StatKey`] names one aggregate the store keeps. The variant fixes both
//! the number of integer fields the key carries and the arity of the value
//! vector stored against it:
//!
//! | variant           | key fields                   | values                           |
//! |-------------------|------------------------------|----------------------------------|
//! | `Node`            | label                        | count                            |
//! | `Relationship`    | start label, type, end label | count                            |
//! | `IndexStatistics` | index, property key          | index size, updates since sample |
//! | `IndexSample`     | index, property key          | unique values, sample size       |
//! | `Empty`           | -                            | never valid                      |

use std::fmt;

use smallvec::{smallvec, SmallVec};

use crate::delta::Delta;
use crate::error::{Error, Result};

/// Label id meaning "any label" in node and relationship keys
pub const ANY_LABEL: i32 = -1;

/// Relationship type id meaning "any type" in relationship keys
pub const ANY_RELATIONSHIP_TYPE: i32 = -1;

/// Discriminant of a [`StatKey`], with its on-disk type tag
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatKeyType {
    /// Sentinel, rejected everywhere
    Empty = 0,
    /// Node count per label
    Node = 2,
    /// Relationship count per (start label, type, end label)
    Relationship = 3,
    /// Index size and updates since the last sample
    IndexStatistics = 4,
    /// Index unique-value estimate and sample size
    IndexSample = 5,
}

impl StatKeyType {
    /// On-disk type tag
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Resolve a type tag. Returns `None` for tags outside the closed set.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(StatKeyType::Empty),
            2 => Some(StatKeyType::Node),
            3 => Some(StatKeyType::Relationship),
            4 => Some(StatKeyType::IndexStatistics),
            5 => Some(StatKeyType::IndexSample),
            _ => None,
        }
    }

    /// Number of int32 fields a key of this type carries
    pub const fn field_count(self) -> usize {
        match self {
            StatKeyType::Empty => 0,
            StatKeyType::Node => 1,
            StatKeyType::Relationship => 3,
            StatKeyType::IndexStatistics | StatKeyType::IndexSample => 2,
        }
    }

    /// Number of int64 values stored against a key of this type
    pub const fn arity(self) -> usize {
        match self {
            StatKeyType::Empty => 0,
            StatKeyType::Node | StatKeyType::Relationship => 1,
            StatKeyType::IndexStatistics | StatKeyType::IndexSample => 2,
        }
    }
}

/// Identifier of one aggregate statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatKey {
    /// Sentinel key. Never valid in a live or persisted map.
    Empty,
    /// Number of nodes carrying `label_id`
    Node {
        /// Label id, or [`ANY_LABEL`]
        label_id: i32,
    },
    /// Number of relationships matching `(start)-[type]->(end)`
    Relationship {
        /// Start node label, or [`ANY_LABEL`]
        start_label_id: i32,
        /// Relationship type, or [`ANY_RELATIONSHIP_TYPE`]
        type_id: i32,
        /// End node label, or [`ANY_LABEL`]
        end_label_id: i32,
    },
    /// Index size / updates since the last sample
    IndexStatistics {
        /// Index id (or label id for label-scoped indexes)
        index_id: i32,
        /// Indexed property key
        property_key_id: i32,
    },
    /// Unique-value estimate / sample size
    IndexSample {
        /// Index id (or label id for label-scoped indexes)
        index_id: i32,
        /// Indexed property key
        property_key_id: i32,
    },
}

impl StatKey {
    /// Node count key
    pub const fn node(label_id: i32) -> Self {
        StatKey::Node { label_id }
    }

    /// Relationship count key
    pub const fn relationship(start_label_id: i32, type_id: i32, end_label_id: i32) -> Self {
        StatKey::Relationship {
            start_label_id,
            type_id,
            end_label_id,
        }
    }

    /// Index statistics key
    pub const fn index_statistics(index_id: i32, property_key_id: i32) -> Self {
        StatKey::IndexStatistics {
            index_id,
            property_key_id,
        }
    }

    /// Index sample key
    pub const fn index_sample(index_id: i32, property_key_id: i32) -> Self {
        StatKey::IndexSample {
            index_id,
            property_key_id,
        }
    }

    /// The key's type
    pub const fn key_type(&self) -> StatKeyType {
        match self {
            StatKey::Empty => StatKeyType::Empty,
            StatKey::Node { .. } => StatKeyType::Node,
            StatKey::Relationship { .. } => StatKeyType::Relationship,
            StatKey::IndexStatistics { .. } => StatKeyType::IndexStatistics,
            StatKey::IndexSample { .. } => StatKeyType::IndexSample,
        }
    }

    /// Length of the value vector stored against this key
    pub const fn arity(&self) -> usize {
        self.key_type().arity()
    }

    /// Whether this is the sentinel key
    pub const fn is_empty(&self) -> bool {
        matches!(self, StatKey::Empty)
    }

    /// The key's integer fields, in wire order
    pub fn fields(&self) -> SmallVec<[i32; 3]> {
        match *self {
            StatKey::Empty => SmallVec::new(),
            StatKey::Node { label_id } => smallvec![label_id],
            StatKey::Relationship {
                start_label_id,
                type_id,
                end_label_id,
            } => smallvec![start_label_id, type_id, end_label_id],
            StatKey::IndexStatistics {
                index_id,
                property_key_id,
            }
            | StatKey::IndexSample {
                index_id,
                property_key_id,
            } => smallvec![index_id, property_key_id],
        }
    }

    /// Rebuild a key from its type and wire-order fields
    ///
    /// Fails with [`Error::EmptyKey`] for the sentinel type and with
    /// [`Error::Corruption`] when the field count is wrong.
    pub fn from_fields(key_type: StatKeyType, fields: &[i32]) -> Result<Self> {
        if fields.len() != key_type.field_count() {
            return Err(Error::Corruption(format!(
                "{:?} key needs {} fields, got {}",
                key_type,
                key_type.field_count(),
                fields.len()
            )));
        }
        match key_type {
            StatKeyType::Empty => Err(Error::EmptyKey),
            StatKeyType::Node => Ok(StatKey::node(fields[0])),
            StatKeyType::Relationship => {
                Ok(StatKey::relationship(fields[0], fields[1], fields[2]))
            }
            StatKeyType::IndexStatistics => Ok(StatKey::index_statistics(fields[0], fields[1])),
            StatKeyType::IndexSample => Ok(StatKey::index_sample(fields[0], fields[1])),
        }
    }

    /// Check that `delta` may be stored against this key
    pub fn check_delta(&self, delta: &Delta) -> Result<()> {
        if self.is_empty() {
            return Err(Error::EmptyKey);
        }
        if delta.len() != self.arity() {
            return Err(Error::ArityMismatch {
                key: *self,
                expected: self.arity(),
                actual: delta.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            StatKey::Empty => write!(f, "EmptyKey"),
            StatKey::Node { label_id } => write!(f, "NodeKey[(:{})]", label_id),
            StatKey::Relationship {
                start_label_id,
                type_id,
                end_label_id,
            } => write!(
                f,
                "RelationshipKey[(:{})-[:{}]->(:{})]",
                start_label_id, type_id, end_label_id
            ),
            StatKey::IndexStatistics {
                index_id,
                property_key_id,
            } => write!(
                f,
                "IndexStatisticsKey[index={}, property={}]",
                index_id, property_key_id
            ),
            StatKey::IndexSample {
                index_id,
                property_key_id,
            } => write!(
                f,
                "IndexSampleKey[index={}, property={}]",
                index_id, property_key_id
            ),
        }
    }
}
