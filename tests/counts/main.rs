//! Counts Store Integration Tests
//!
//! End-to-end behaviour of the aggregate map, snapshot coordinator, codec
//! and store lifecycle.

#[path = "../common/mod.rs"]
mod common;

mod commutativity;
mod scenarios;
mod snapshot_exactness;
mod store_recovery;
