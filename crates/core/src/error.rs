//! Error types for Tally
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Errors fall into four groups:
//! - Contract violations: the caller broke an API rule. Never retried.
//! - I/O failures while encoding, decoding or persisting a snapshot.
//! - Corruption: a stream or file that cannot be a valid snapshot.
//! - Snapshot wait failures: interrupted or timed out while waiting for
//!   in-flight transactions.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::key::StatKey;
use crate::TxnId;

/// Result type alias for Tally operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the counts store
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (snapshot channel or checkpoint file)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A snapshot was requested while another one is pending
    #[error("Snapshot already in progress (pending target txn {target})")]
    SnapshotInProgress {
        /// Target of the snapshot that is already pending
        target: TxnId,
    },

    /// A delta's length disagrees with its key's arity
    #[error("Delta arity mismatch for {key}: expected {expected} values, got {actual}")]
    ArityMismatch {
        /// Offending key
        key: StatKey,
        /// Arity declared by the key's variant
        expected: usize,
        /// Length of the supplied delta
        actual: usize,
    },

    /// The sentinel key showed up in a live map, diff or stream
    #[error("Empty key is not a valid statistic key")]
    EmptyKey,

    /// A type tag outside the closed key set
    #[error("Unknown statistic key type tag: {0}")]
    UnknownTypeTag(u8),

    /// The snapshot wait was interrupted
    #[error("Snapshot construction interrupted while waiting for txn {target}")]
    SnapshotInterrupted {
        /// Target the abandoned snapshot was waiting for
        target: TxnId,
    },

    /// The snapshot wait exceeded the configured limit
    #[error(
        "Snapshot timed out after {waited:?} waiting for txn {target} (watermark {watermark})"
    )]
    SnapshotTimedOut {
        /// Target the abandoned snapshot was waiting for
        target: TxnId,
        /// Gap-free watermark when the wait gave up
        watermark: TxnId,
        /// How long the snapshot waited
        waited: Duration,
    },

    /// Operation not valid in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Bad or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error reports a broken API contract
    ///
    /// Contract violations are fatal for the operation and must not be retried.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::SnapshotInProgress { .. }
                | Error::ArityMismatch { .. }
                | Error::EmptyKey
                | Error::UnknownTypeTag(_)
        )
    }

    /// Whether this error came from the underlying byte channel
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}
