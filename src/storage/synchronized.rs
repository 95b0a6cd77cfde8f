//! Handler-facing view of the current unit of work.

use serde_json::Value;
use tokio::sync::oneshot;

use super::StorageSession;
use crate::error::{PersistenceError, Result};
use crate::interfaces::{Container, PatchOperation};
use crate::operations::{
    CreateItemOperation, DeleteItemOperation, Operation, PatchItemOperation, ReadItemOperation,
    ReplaceItemOperation, UpsertItemOperation,
};
use crate::partition::{ContainerHolder, PartitionKey, PartitionKeyPath};
use crate::pipeline::ConcurrencyTokens;

/// Lets handler code enqueue its own item operations into the same grouped
/// writes as the saga and outbox writes of the message being processed.
///
/// Obtained from [`MessageContext::synchronized_storage`](crate::pipeline::MessageContext::synchronized_storage).
pub struct SynchronizedStorageSession<'a> {
    message_id: &'a str,
    session: &'a mut StorageSession,
    partition_key: Option<&'a PartitionKey>,
    container_holder: Option<&'a ContainerHolder>,
    tokens: &'a ConcurrencyTokens,
}

impl<'a> SynchronizedStorageSession<'a> {
    pub(crate) fn new(
        message_id: &'a str,
        session: &'a mut StorageSession,
        partition_key: Option<&'a PartitionKey>,
        container_holder: Option<&'a ContainerHolder>,
        tokens: &'a ConcurrencyTokens,
    ) -> Self {
        Self {
            message_id,
            session,
            partition_key,
            container_holder,
            tokens,
        }
    }

    /// Partition key resolved for the current message.
    pub fn partition_key(&self) -> Result<&PartitionKey> {
        self.partition_key
            .ok_or_else(|| PersistenceError::MissingPartitionKey {
                message_id: self.message_id.to_string(),
            })
    }

    /// Partition key path of the resolved container.
    pub fn partition_key_path(&self) -> Result<&PartitionKeyPath> {
        Ok(self.holder()?.partition_key_path())
    }

    /// The resolved container, for point reads outside the grouped write.
    pub fn container(&self) -> Result<&dyn Container> {
        Ok(self.holder()?.container().as_ref())
    }

    /// ETag last observed for a document of the current partition in this
    /// message.
    pub fn concurrency_token(&self, id: &str) -> Option<&str> {
        self.partition_key.and_then(|pk| self.tokens.get(pk, id))
    }

    /// Queue an arbitrary operation.
    pub fn add_operation(&mut self, operation: Box<dyn Operation>) {
        self.session.add_operation(operation);
    }

    pub fn add<O: Operation + 'static>(&mut self, operation: O) {
        self.session.add(operation);
    }

    pub fn create_item(&mut self, document: Value) -> Result<()> {
        let pk = self.partition_key()?.clone();
        self.add(CreateItemOperation::new(pk, document));
        Ok(())
    }

    pub fn upsert_item(&mut self, document: Value) -> Result<()> {
        let pk = self.partition_key()?.clone();
        self.add(UpsertItemOperation::new(pk, document));
        Ok(())
    }

    /// Replace an item, guarded by its recorded ETag when one exists.
    pub fn replace_item(&mut self, id: &str, document: Value) -> Result<()> {
        let pk = self.partition_key()?.clone();
        let if_match = self.tokens.get(&pk, id).map(str::to_string);
        let mut op = ReplaceItemOperation::new(id, pk, document);
        if let Some(etag) = if_match {
            op = op.if_match(etag);
        }
        self.add(op);
        Ok(())
    }

    /// Delete an item, guarded by its recorded ETag when one exists.
    pub fn delete_item(&mut self, id: &str) -> Result<()> {
        let pk = self.partition_key()?.clone();
        let if_match = self.tokens.get(&pk, id).map(str::to_string);
        let mut op = DeleteItemOperation::new(id, pk);
        if let Some(etag) = if_match {
            op = op.if_match(etag);
        }
        self.add(op);
        Ok(())
    }

    pub fn patch_item(&mut self, id: &str, operations: Vec<PatchOperation>) -> Result<()> {
        let pk = self.partition_key()?.clone();
        self.add(PatchItemOperation::new(id, pk, operations));
        Ok(())
    }

    /// Read an item inside the grouped write. The document arrives on the
    /// receiver once the unit of work commits.
    pub fn read_item(&mut self, id: &str) -> Result<oneshot::Receiver<Value>> {
        let pk = self.partition_key()?.clone();
        let (op, rx) = ReadItemOperation::new(id, pk);
        self.add(op);
        Ok(rx)
    }

    fn holder(&self) -> Result<&'a ContainerHolder> {
        self.container_holder
            .ok_or(PersistenceError::MissingContainer)
    }
}
