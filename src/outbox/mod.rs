//! Outbox deduplication over partitioned containers.
//!
//! A processed message leaves an [`OutboxRecord`] under its message id in the
//! message's partition. Redelivery finds the record and replays its transport
//! operations instead of running the handler again.

mod behaviors;
mod persister;
mod record;
mod transaction;

pub use behaviors::{HeaderExtractionStep, LogicalOutboxStep, MessageExtractionStep};
pub use persister::OutboxPersister;
pub use record::{OutboxRecord, StoredTransportOperation};
pub use transaction::OutboxTransaction;

/// Entity type stamped into outbox record metadata.
pub const OUTBOX_ENTITY_TYPE: &str = "OutboxRecord";
