//! Engine layer for Tally
//!
//! [`CountsStore`] is the entry point: it owns the live aggregate map, the
//! commit tracker and the snapshot coordinator, and persists checkpoints in
//! a data directory configured through `tally.toml`.
//!
//! ```text
//! use tally_engine::CountsStore;
//!
//! let store = CountsStore::open("/path/to/counts")?;
//! store.apply(txn_id, &diff)?;
//! let snapshot = store.snapshot(txn_id)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod store;

pub use config::{TallyConfig, CONFIG_FILE_NAME};
pub use store::CountsStore;
