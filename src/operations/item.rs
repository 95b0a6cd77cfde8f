//! Application-defined item operations.
//!
//! Handlers queue these into the same grouped write as the framework's own
//! saga and outbox writes. Written documents are enriched with the partition
//! key at the container's partition key path.

use serde_json::Value;
use tokio::sync::oneshot;

use super::{document_id, Operation};
use crate::error::{PersistenceError, Result};
use crate::interfaces::{OperationResult, PatchOperation, TransactionalBatch};
use crate::partition::{PartitionKey, PartitionKeyPath};
use crate::pipeline::ConcurrencyTokens;

fn item_conflict(verb: &str, id: &str, result: &OperationResult) -> PersistenceError {
    PersistenceError::Conflict {
        description: format!("Failed to {} item '{}'", verb, id),
        result: result.clone(),
    }
}

fn enriched(document: Option<Value>, key: &PartitionKey, path: &PartitionKeyPath) -> Result<Value> {
    let mut document = document.unwrap_or(Value::Null);
    path.enrich(&mut document, key)?;
    Ok(document)
}

/// Create an item. Fails if an item with the same id exists.
pub struct CreateItemOperation {
    id: String,
    partition_key: PartitionKey,
    document: Option<Value>,
}

impl CreateItemOperation {
    pub fn new(partition_key: PartitionKey, document: Value) -> Self {
        Self {
            id: document_id(&document).unwrap_or_default().to_string(),
            partition_key,
            document: Some(document),
        }
    }
}

impl Operation for CreateItemOperation {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn apply(&mut self, batch: &mut TransactionalBatch, path: &PartitionKeyPath) -> Result<()> {
        batch.create_item(enriched(self.document.take(), &self.partition_key, path)?);
        Ok(())
    }

    fn success(&mut self, result: &OperationResult, tokens: &mut ConcurrencyTokens) {
        tokens.record(&self.partition_key, &self.id, result.etag.as_deref());
    }

    fn conflict(&mut self, result: &OperationResult) -> PersistenceError {
        item_conflict("create", &self.id, result)
    }

    fn dispose(&mut self) {
        self.document = None;
    }
}

/// Insert or replace an item.
pub struct UpsertItemOperation {
    id: String,
    partition_key: PartitionKey,
    document: Option<Value>,
    if_match: Option<String>,
}

impl UpsertItemOperation {
    pub fn new(partition_key: PartitionKey, document: Value) -> Self {
        Self {
            id: document_id(&document).unwrap_or_default().to_string(),
            partition_key,
            document: Some(document),
            if_match: None,
        }
    }

    pub fn if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }
}

impl Operation for UpsertItemOperation {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn apply(&mut self, batch: &mut TransactionalBatch, path: &PartitionKeyPath) -> Result<()> {
        let document = enriched(self.document.take(), &self.partition_key, path)?;
        batch.upsert_item(document, self.if_match.clone());
        Ok(())
    }

    fn success(&mut self, result: &OperationResult, tokens: &mut ConcurrencyTokens) {
        tokens.record(&self.partition_key, &self.id, result.etag.as_deref());
    }

    fn conflict(&mut self, result: &OperationResult) -> PersistenceError {
        item_conflict("upsert", &self.id, result)
    }

    fn dispose(&mut self) {
        self.document = None;
    }
}

/// Replace an existing item.
pub struct ReplaceItemOperation {
    id: String,
    partition_key: PartitionKey,
    document: Option<Value>,
    if_match: Option<String>,
}

impl ReplaceItemOperation {
    pub fn new(id: impl Into<String>, partition_key: PartitionKey, document: Value) -> Self {
        Self {
            id: id.into(),
            partition_key,
            document: Some(document),
            if_match: None,
        }
    }

    pub fn if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }
}

impl Operation for ReplaceItemOperation {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn apply(&mut self, batch: &mut TransactionalBatch, path: &PartitionKeyPath) -> Result<()> {
        let document = enriched(self.document.take(), &self.partition_key, path)?;
        batch.replace_item(self.id.clone(), document, self.if_match.clone());
        Ok(())
    }

    fn success(&mut self, result: &OperationResult, tokens: &mut ConcurrencyTokens) {
        tokens.record(&self.partition_key, &self.id, result.etag.as_deref());
    }

    fn conflict(&mut self, result: &OperationResult) -> PersistenceError {
        item_conflict("replace", &self.id, result)
    }

    fn dispose(&mut self) {
        self.document = None;
    }
}

/// Delete an item.
pub struct DeleteItemOperation {
    id: String,
    partition_key: PartitionKey,
    if_match: Option<String>,
}

impl DeleteItemOperation {
    pub fn new(id: impl Into<String>, partition_key: PartitionKey) -> Self {
        Self {
            id: id.into(),
            partition_key,
            if_match: None,
        }
    }

    pub fn if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }
}

impl Operation for DeleteItemOperation {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn apply(&mut self, batch: &mut TransactionalBatch, _path: &PartitionKeyPath) -> Result<()> {
        batch.delete_item(self.id.clone(), self.if_match.clone());
        Ok(())
    }

    fn success(&mut self, _result: &OperationResult, tokens: &mut ConcurrencyTokens) {
        tokens.remove(&self.partition_key, &self.id);
    }

    fn conflict(&mut self, result: &OperationResult) -> PersistenceError {
        item_conflict("delete", &self.id, result)
    }
}

/// Read an item as part of the grouped write.
///
/// The document is delivered through the receiver returned by `new` once the
/// batch commits. The receiver errors if the batch never executes.
pub struct ReadItemOperation {
    id: String,
    partition_key: PartitionKey,
    reply: Option<oneshot::Sender<Value>>,
}

impl ReadItemOperation {
    pub fn new(id: impl Into<String>, partition_key: PartitionKey) -> (Self, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        let op = Self {
            id: id.into(),
            partition_key,
            reply: Some(tx),
        };
        (op, rx)
    }
}

impl Operation for ReadItemOperation {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn apply(&mut self, batch: &mut TransactionalBatch, _path: &PartitionKeyPath) -> Result<()> {
        batch.read_item(self.id.clone());
        Ok(())
    }

    fn success(&mut self, result: &OperationResult, tokens: &mut ConcurrencyTokens) {
        tokens.record(&self.partition_key, &self.id, result.etag.as_deref());
        if let (Some(reply), Some(resource)) = (self.reply.take(), result.resource.clone()) {
            // The caller may have dropped the receiver.
            let _ = reply.send(resource);
        }
    }

    fn conflict(&mut self, result: &OperationResult) -> PersistenceError {
        item_conflict("read", &self.id, result)
    }

    fn dispose(&mut self) {
        self.reply = None;
    }
}

/// Apply patch mutations to an existing item.
pub struct PatchItemOperation {
    id: String,
    partition_key: PartitionKey,
    operations: Vec<PatchOperation>,
    if_match: Option<String>,
}

impl PatchItemOperation {
    pub fn new(id: impl Into<String>, partition_key: PartitionKey, operations: Vec<PatchOperation>) -> Self {
        Self {
            id: id.into(),
            partition_key,
            operations,
            if_match: None,
        }
    }

    pub fn if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }
}

impl Operation for PatchItemOperation {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn apply(&mut self, batch: &mut TransactionalBatch, _path: &PartitionKeyPath) -> Result<()> {
        batch.patch_item(
            self.id.clone(),
            std::mem::take(&mut self.operations),
            self.if_match.clone(),
        );
        Ok(())
    }

    fn success(&mut self, result: &OperationResult, tokens: &mut ConcurrencyTokens) {
        tokens.record(&self.partition_key, &self.id, result.etag.as_deref());
    }

    fn conflict(&mut self, result: &OperationResult) -> PersistenceError {
        item_conflict("patch", &self.id, result)
    }
}
