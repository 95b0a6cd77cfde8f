//! Saga lifecycle operations.

use serde_json::Value;

use super::{prepare_document, Operation};
use crate::error::{PersistenceError, Result};
use crate::interfaces::{status, OperationResult, TransactionalBatch};
use crate::partition::{PartitionKey, PartitionKeyPath};
use crate::pipeline::ConcurrencyTokens;

/// Create a new saga document. Fails if one already exists with that id.
pub struct SagaSaveOperation {
    entity_type: String,
    saga_id: String,
    partition_key: PartitionKey,
    document: Option<Value>,
}

impl SagaSaveOperation {
    pub fn new(
        entity_type: impl Into<String>,
        saga_id: impl Into<String>,
        partition_key: PartitionKey,
        document: Value,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            saga_id: saga_id.into(),
            partition_key,
            document: Some(document),
        }
    }
}

impl Operation for SagaSaveOperation {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn apply(&mut self, batch: &mut TransactionalBatch, path: &PartitionKeyPath) -> Result<()> {
        let document = self.document.take().unwrap_or(Value::Null);
        let document = prepare_document(document, &self.entity_type, &self.partition_key, path)?;
        batch.create_item(document);
        Ok(())
    }

    fn success(&mut self, result: &OperationResult, tokens: &mut ConcurrencyTokens) {
        tokens.record(&self.partition_key, &self.saga_id, result.etag.as_deref());
    }

    fn conflict(&mut self, result: &OperationResult) -> PersistenceError {
        let description = if result.status == status::CONFLICT {
            format!(
                "The '{}' saga with id '{}' could not be created because it already exists",
                self.entity_type, self.saga_id
            )
        } else {
            format!(
                "The '{}' saga with id '{}' could not be created",
                self.entity_type, self.saga_id
            )
        };
        PersistenceError::Conflict {
            description,
            result: result.clone(),
        }
    }

    fn dispose(&mut self) {
        self.document = None;
    }
}

/// Replace an existing saga document, guarded by its last known ETag.
pub struct SagaUpdateOperation {
    entity_type: String,
    saga_id: String,
    partition_key: PartitionKey,
    document: Option<Value>,
    if_match: Option<String>,
}

impl SagaUpdateOperation {
    pub fn new(
        entity_type: impl Into<String>,
        saga_id: impl Into<String>,
        partition_key: PartitionKey,
        document: Value,
        if_match: Option<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            saga_id: saga_id.into(),
            partition_key,
            document: Some(document),
            if_match,
        }
    }
}

impl Operation for SagaUpdateOperation {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn apply(&mut self, batch: &mut TransactionalBatch, path: &PartitionKeyPath) -> Result<()> {
        let document = self.document.take().unwrap_or(Value::Null);
        let document = prepare_document(document, &self.entity_type, &self.partition_key, path)?;
        batch.replace_item(self.saga_id.clone(), document, self.if_match.clone());
        Ok(())
    }

    fn success(&mut self, result: &OperationResult, tokens: &mut ConcurrencyTokens) {
        tokens.record(&self.partition_key, &self.saga_id, result.etag.as_deref());
    }

    fn conflict(&mut self, result: &OperationResult) -> PersistenceError {
        PersistenceError::SagaConcurrency {
            entity_type: self.entity_type.clone(),
            saga_id: self.saga_id.clone(),
            result: result.clone(),
        }
    }

    fn dispose(&mut self) {
        self.document = None;
    }
}

/// Delete a completed saga, guarded by its last known ETag.
pub struct SagaDeleteOperation {
    entity_type: String,
    saga_id: String,
    partition_key: PartitionKey,
    if_match: Option<String>,
}

impl SagaDeleteOperation {
    pub fn new(
        entity_type: impl Into<String>,
        saga_id: impl Into<String>,
        partition_key: PartitionKey,
        if_match: Option<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            saga_id: saga_id.into(),
            partition_key,
            if_match,
        }
    }
}

impl Operation for SagaDeleteOperation {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn apply(&mut self, batch: &mut TransactionalBatch, _path: &PartitionKeyPath) -> Result<()> {
        batch.delete_item(self.saga_id.clone(), self.if_match.clone());
        Ok(())
    }

    fn success(&mut self, _result: &OperationResult, tokens: &mut ConcurrencyTokens) {
        tokens.remove(&self.partition_key, &self.saga_id);
    }

    fn conflict(&mut self, result: &OperationResult) -> PersistenceError {
        PersistenceError::SagaConcurrency {
            entity_type: self.entity_type.clone(),
            saga_id: self.saga_id.clone(),
            result: result.clone(),
        }
    }
}
