//! Outbox record operations.

use serde_json::Value;

use super::{prepare_document, Operation};
use crate::error::{PersistenceError, Result};
use crate::interfaces::{status, OperationResult, TransactionalBatch};
use crate::outbox::OUTBOX_ENTITY_TYPE;
use crate::partition::{PartitionKey, PartitionKeyPath};

/// Persist the outbox record for a message handled in this unit of work.
///
/// A create, so a concurrent duplicate of the same message fails the batch
/// instead of overwriting the first record.
pub struct OutboxStoreOperation {
    message_id: String,
    partition_key: PartitionKey,
    document: Option<Value>,
}

impl OutboxStoreOperation {
    pub fn new(message_id: impl Into<String>, partition_key: PartitionKey, document: Value) -> Self {
        Self {
            message_id: message_id.into(),
            partition_key,
            document: Some(document),
        }
    }
}

impl Operation for OutboxStoreOperation {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn apply(&mut self, batch: &mut TransactionalBatch, path: &PartitionKeyPath) -> Result<()> {
        let document = self.document.take().unwrap_or(Value::Null);
        let document = prepare_document(document, OUTBOX_ENTITY_TYPE, &self.partition_key, path)?;
        batch.create_item(document);
        Ok(())
    }

    fn conflict(&mut self, result: &OperationResult) -> PersistenceError {
        let description = if result.status == status::CONFLICT {
            format!(
                "The outbox record for message '{}' already exists; the message was processed concurrently",
                self.message_id
            )
        } else {
            format!(
                "Unable to store the outbox record for message '{}'",
                self.message_id
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

/// Mark an outbox record dispatched: clear its transport operations and let it
/// expire after the deduplication retention.
pub struct OutboxDeleteOperation {
    message_id: String,
    partition_key: PartitionKey,
    document: Option<Value>,
}

impl OutboxDeleteOperation {
    pub fn new(message_id: impl Into<String>, partition_key: PartitionKey, document: Value) -> Self {
        Self {
            message_id: message_id.into(),
            partition_key,
            document: Some(document),
        }
    }
}

impl Operation for OutboxDeleteOperation {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn apply(&mut self, batch: &mut TransactionalBatch, path: &PartitionKeyPath) -> Result<()> {
        let document = self.document.take().unwrap_or(Value::Null);
        let document = prepare_document(document, OUTBOX_ENTITY_TYPE, &self.partition_key, path)?;
        batch.upsert_item(document, None);
        Ok(())
    }

    fn conflict(&mut self, result: &OperationResult) -> PersistenceError {
        PersistenceError::Conflict {
            description: format!(
                "Unable to mark the outbox record for message '{}' as dispatched",
                self.message_id
            ),
            result: result.clone(),
        }
    }

    fn dispose(&mut self) {
        self.document = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::BatchOperation;
    use serde_json::json;

    #[test]
    fn test_store_is_a_create_with_partition_key() {
        let path = PartitionKeyPath::parse("/deep/down").unwrap();
        let mut op = OutboxStoreOperation::new(
            "m-1",
            PartitionKey::from("P1"),
            json!({"id": "m-1", "dispatched": false}),
        );
        let mut batch = TransactionalBatch::new(PartitionKey::from("P1"));
        op.apply(&mut batch, &path).unwrap();

        match &batch.operations()[0] {
            BatchOperation::Create { document } => assert_eq!(document["deep"]["down"], "P1"),
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_store_conflict_describes_duplicate() {
        let mut op = OutboxStoreOperation::new("m-1", PartitionKey::from("P1"), json!({}));
        let err = op.conflict(&OperationResult::new(status::CONFLICT));
        assert!(err.to_string().contains("m-1"));
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_delete_is_an_upsert() {
        let path = PartitionKeyPath::parse("/pk").unwrap();
        let mut op = OutboxDeleteOperation::new(
            "m-1",
            PartitionKey::from("P1"),
            json!({"id": "m-1", "dispatched": true, "ttl": 60}),
        );
        let mut batch = TransactionalBatch::new(PartitionKey::from("P1"));
        op.apply(&mut batch, &path).unwrap();
        assert_eq!(batch.operations()[0].verb(), "upsert");
    }
}
