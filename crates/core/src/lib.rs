//! Core types for Tally
//!
//! This crate defines the foundational types shared by every layer:
//! - TxnId: Transaction identifier assigned by the commit pipeline
//! - StatKey / StatKeyType: The closed set of statistic identifiers
//! - Delta: Fixed-length signed vector merged per key
//! - Diff: The per-transaction set of key deltas
//! - CountsSnapshot: Immutable point-in-time copy of all statistics
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod delta;
pub mod error;
pub mod key;
pub mod snapshot;

pub use delta::{Delta, Diff};
pub use error::{Error, Result};
pub use key::{StatKey, StatKeyType, ANY_LABEL, ANY_RELATIONSHIP_TYPE};
pub use snapshot::CountsSnapshot;

/// Transaction identifier
///
/// Ids are assigned by the commit pipeline and are dense: every id between
/// the tracker origin and the newest transaction eventually gets offered.
/// Zero means "before any transaction".
pub type TxnId = u64;
