//! Batchstore - partitioned document persistence for message handlers.
//!
//! Maps outbox deduplication, saga state, and handler-owned item writes onto
//! a partitioned document store whose atomic grouped writes are scoped to one
//! partition key. Every write requested while handling a message is queued
//! into a storage session and committed as one grouped write per partition
//! key.

pub mod config;
pub mod error;
pub mod extraction;
pub mod interfaces;
pub mod operations;
pub mod outbox;
pub mod partition;
pub mod pipeline;
pub mod saga;
pub mod storage;
pub mod utils;

pub use error::{PersistenceError, Result};
