//! Storage operations queued during message processing.
//!
//! An operation is bound to one partition key. At commit it applies itself
//! onto the grouped write for that key, then reacts to its positional result:
//! `success` on a 2xx, `conflict` otherwise. `dispose` releases whatever the
//! operation still holds and is called exactly once, executed or not.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PersistenceError, Result};
use crate::interfaces::{OperationResult, TransactionalBatch};
use crate::partition::{PartitionKey, PartitionKeyPath};
use crate::pipeline::ConcurrencyTokens;

mod item;
mod lock;
mod outbox;
mod saga;

pub use item::{
    CreateItemOperation, DeleteItemOperation, PatchItemOperation, ReadItemOperation,
    ReplaceItemOperation, UpsertItemOperation,
};
pub use lock::ReleaseLockOperation;
pub use outbox::{OutboxDeleteOperation, OutboxStoreOperation};
pub use saga::{SagaDeleteOperation, SagaSaveOperation, SagaUpdateOperation};

/// Document field holding persistence metadata.
pub const METADATA_FIELD: &str = "_metadata";
/// Schema version written into every document this crate produces.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Which pool of the storage session an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Part of the unit of work; written only on commit.
    Regular,
    /// Best-effort compensation; executed when the unit of work aborts.
    ReleaseLock,
}

/// A pending read or write against the store.
pub trait Operation: Send + Sync {
    /// Partition this operation targets.
    fn partition_key(&self) -> &PartitionKey;

    fn kind(&self) -> OperationKind {
        OperationKind::Regular
    }

    /// Add this operation to the grouped write for its partition key.
    ///
    /// `path` is the container's partition key path; written documents must
    /// carry the partition key there.
    fn apply(&mut self, batch: &mut TransactionalBatch, path: &PartitionKeyPath) -> Result<()>;

    /// React to a successful result.
    fn success(&mut self, result: &OperationResult, tokens: &mut ConcurrencyTokens) {
        let _ = (result, tokens);
    }

    /// Build the domain error for a failed result.
    fn conflict(&mut self, result: &OperationResult) -> PersistenceError;

    /// Release held resources. Called once per operation.
    fn dispose(&mut self) {}
}

/// Persistence metadata carried by stored documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub schema_version: String,
    pub entity_type: String,
}

impl DocumentMetadata {
    pub fn current(entity_type: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            entity_type: entity_type.into(),
        }
    }
}

/// Stamp metadata and the partition key into a document before writing it.
pub(crate) fn prepare_document(
    mut document: Value,
    entity_type: &str,
    partition_key: &PartitionKey,
    path: &PartitionKeyPath,
) -> Result<Value> {
    let object = document.as_object_mut().ok_or_else(|| {
        PersistenceError::Configuration(format!(
            "Documents of type '{}' must serialize to a JSON object",
            entity_type
        ))
    })?;
    object.insert(
        METADATA_FIELD.to_string(),
        serde_json::to_value(DocumentMetadata::current(entity_type))?,
    );
    path.enrich(&mut document, partition_key)?;
    Ok(document)
}

/// Read the `id` of a document, if it has a string id.
pub(crate) fn document_id(document: &Value) -> Option<&str> {
    document.get("id").and_then(Value::as_str)
}
