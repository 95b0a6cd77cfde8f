//! Saga persistence.
//!
//! Saga documents live in the message's partition and are written through the
//! storage session, so a saga change commits atomically with the outbox record
//! and any item operations of the same message.

mod id;
mod locking;
mod persister;

pub use id::SagaIdGenerator;
pub use persister::SagaPersister;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// Document field holding the lease expiry (RFC 3339). Null when unlocked.
pub const RESERVED_UNTIL_FIELD: &str = "_reserved_until";

/// Saga state persisted as a document.
pub trait SagaData: Serialize + DeserializeOwned + Send + Sync {
    /// Entity type recorded in the document metadata and used in saga ids.
    const ENTITY_TYPE: &'static str;

    fn id(&self) -> Uuid;
}
