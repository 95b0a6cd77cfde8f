//! Per-message processing context.
//!
//! Threaded explicitly through every pipeline step and handler. Carries the
//! resolved partition information, the storage session, the outbox
//! transaction, and the transport operations pending dispatch.

use std::any::Any;
use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::error::{PersistenceError, Result};
use crate::outbox::OutboxTransaction;
use crate::partition::{ContainerHolder, ContainerInformation, PartitionKey};
use crate::storage::{StorageSession, SynchronizedStorageSession};

/// Message headers.
pub type Headers = HashMap<String, String>;

/// An outgoing message produced while handling the incoming one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOperation {
    pub message_id: String,
    pub destination: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub options: HashMap<String, String>,
}

impl TransportOperation {
    pub fn new(message_id: impl Into<String>, destination: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            message_id: message_id.into(),
            destination: destination.into(),
            headers: Headers::new(),
            body,
            options: HashMap::new(),
        }
    }
}

/// Transport operations pending dispatch for the current message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTransportOperations {
    operations: Vec<TransportOperation>,
}

impl PendingTransportOperations {
    pub fn add(&mut self, operation: TransportOperation) {
        self.operations.push(operation);
    }

    pub fn extend(&mut self, operations: impl IntoIterator<Item = TransportOperation>) {
        self.operations.extend(operations);
    }

    pub fn clear(&mut self) {
        self.operations.clear();
    }

    pub fn drain(&mut self) -> Vec<TransportOperation> {
        std::mem::take(&mut self.operations)
    }

    pub fn operations(&self) -> &[TransportOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// ETags observed for documents during this message, keyed by partition key
/// and document id. Ids are only unique within a partition.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyTokens {
    etags: HashMap<(PartitionKey, String), String>,
}

impl ConcurrencyTokens {
    /// Record the ETag for a document. `None` leaves any previous token alone.
    pub fn record(&mut self, partition_key: &PartitionKey, id: &str, etag: Option<&str>) {
        if let Some(etag) = etag {
            self.etags
                .insert((partition_key.clone(), id.to_string()), etag.to_string());
        }
    }

    pub fn get(&self, partition_key: &PartitionKey, id: &str) -> Option<&str> {
        self.etags
            .get(&(partition_key.clone(), id.to_string()))
            .map(String::as_str)
    }

    pub fn remove(&mut self, partition_key: &PartitionKey, id: &str) -> Option<String> {
        self.etags.remove(&(partition_key.clone(), id.to_string()))
    }
}

/// Request-scoped state for one incoming message.
pub struct MessageContext {
    message_id: String,
    headers: Headers,
    message: Option<Box<dyn Any + Send + Sync>>,
    cancellation: CancellationToken,
    partition_key: Option<PartitionKey>,
    container_information: Option<ContainerInformation>,
    container_holder: Option<ContainerHolder>,
    outbox_transaction: Option<OutboxTransaction>,
    storage_session: StorageSession,
    pending_operations: PendingTransportOperations,
    concurrency_tokens: ConcurrencyTokens,
}

impl MessageContext {
    pub fn new(message_id: impl Into<String>, headers: Headers) -> Self {
        Self {
            message_id: message_id.into(),
            headers,
            message: None,
            cancellation: CancellationToken::new(),
            partition_key: None,
            container_information: None,
            container_holder: None,
            outbox_transaction: None,
            storage_session: StorageSession::new(),
            pending_operations: PendingTransportOperations::default(),
            concurrency_tokens: ConcurrencyTokens::default(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_message<M: Any + Send + Sync>(mut self, message: M) -> Self {
        self.set_message(message);
        self
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The deserialized message, once the logical stage has it.
    pub fn message(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.message.as_deref()
    }

    pub fn set_message<M: Any + Send + Sync>(&mut self, message: M) {
        self.message = Some(Box::new(message));
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn partition_key(&self) -> Option<&PartitionKey> {
        self.partition_key.as_ref()
    }

    pub fn set_partition_key(&mut self, partition_key: PartitionKey) {
        self.partition_key = Some(partition_key);
    }

    /// The partition key, or a configuration error naming the remedy.
    pub fn required_partition_key(&self) -> Result<&PartitionKey> {
        self.partition_key
            .as_ref()
            .ok_or_else(|| PersistenceError::MissingPartitionKey {
                message_id: self.message_id.clone(),
            })
    }

    pub fn container_information(&self) -> Option<&ContainerInformation> {
        self.container_information.as_ref()
    }

    pub fn set_container_information(&mut self, info: ContainerInformation) {
        self.container_information = Some(info);
    }

    pub fn container_holder(&self) -> Option<&ContainerHolder> {
        self.container_holder.as_ref()
    }

    pub fn set_container_holder(&mut self, holder: ContainerHolder) {
        self.container_holder = Some(holder);
    }

    /// The resolved container, or a configuration error naming the remedies.
    pub fn required_container_holder(&self) -> Result<&ContainerHolder> {
        self.container_holder
            .as_ref()
            .ok_or(PersistenceError::MissingContainer)
    }

    pub fn outbox_transaction(&self) -> Option<&OutboxTransaction> {
        self.outbox_transaction.as_ref()
    }

    pub fn outbox_transaction_mut(&mut self) -> Option<&mut OutboxTransaction> {
        self.outbox_transaction.as_mut()
    }

    /// Start an outbox transaction. Its storage session replaces the
    /// context's own, so all writes of this message share one unit of work.
    pub fn begin_outbox_transaction(&mut self) -> &mut OutboxTransaction {
        let session = std::mem::take(&mut self.storage_session);
        self.outbox_transaction
            .insert(OutboxTransaction::new(session))
    }

    pub fn pending_operations(&self) -> &PendingTransportOperations {
        &self.pending_operations
    }

    pub fn pending_operations_mut(&mut self) -> &mut PendingTransportOperations {
        &mut self.pending_operations
    }

    pub fn concurrency_tokens(&self) -> &ConcurrencyTokens {
        &self.concurrency_tokens
    }

    pub fn concurrency_tokens_mut(&mut self) -> &mut ConcurrencyTokens {
        &mut self.concurrency_tokens
    }

    /// The active storage session: the outbox transaction's when one is open.
    pub fn storage_session_mut(&mut self) -> &mut StorageSession {
        match self.outbox_transaction.as_mut() {
            Some(transaction) => transaction.session_mut(),
            None => &mut self.storage_session,
        }
    }

    /// Accessor for handler code: the current unit of work plus the resolved
    /// partition key, partition key path, and container.
    pub fn synchronized_storage(&mut self) -> SynchronizedStorageSession<'_> {
        let session = match self.outbox_transaction.as_mut() {
            Some(transaction) => transaction.session_mut(),
            None => &mut self.storage_session,
        };
        SynchronizedStorageSession::new(
            &self.message_id,
            session,
            self.partition_key.as_ref(),
            self.container_holder.as_ref(),
            &self.concurrency_tokens,
        )
    }

    /// Commit every queued operation, one grouped write per partition key.
    pub async fn commit_storage(&mut self) -> Result<()> {
        let session = match self.outbox_transaction.as_mut() {
            Some(transaction) => transaction.session_mut(),
            None => &mut self.storage_session,
        };
        session
            .commit(
                self.container_holder.as_ref(),
                &mut self.concurrency_tokens,
                &self.cancellation,
            )
            .await
    }

    /// End the unit of work. Uncommitted operations are discarded; pending
    /// lease releases are attempted.
    pub async fn dispose_storage(&mut self) {
        let session = match self.outbox_transaction.as_mut() {
            Some(transaction) => transaction.session_mut(),
            None => &mut self.storage_session,
        };
        session
            .dispose(
                self.container_holder.as_ref(),
                &mut self.concurrency_tokens,
                &self.cancellation,
            )
            .await;
    }
}

impl std::fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageContext")
            .field("message_id", &self.message_id)
            .field("partition_key", &self.partition_key)
            .field("container_information", &self.container_information)
            .field("container_holder", &self.container_holder)
            .field("pending_operations", &self.pending_operations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct OrderPlaced {
        order_id: String,
    }

    #[test]
    fn test_message_downcasts_to_concrete_type() {
        let ctx = MessageContext::new("m-1", Headers::new()).with_message(OrderPlaced {
            order_id: "o-1".into(),
        });
        let message: &dyn Any = ctx.message().unwrap();
        let order = message.downcast_ref::<OrderPlaced>().unwrap();
        assert_eq!(order.order_id, "o-1");
    }

    #[test]
    fn test_required_partition_key_names_message() {
        let ctx = MessageContext::new("m-7", Headers::new());
        let err = ctx.required_partition_key().unwrap_err();
        assert!(err.to_string().contains("m-7"));
    }

    #[test]
    fn test_concurrency_tokens_ignore_missing_etag() {
        let pk = PartitionKey::from("P1");
        let mut tokens = ConcurrencyTokens::default();
        tokens.record(&pk, "a", Some("e1"));
        tokens.record(&pk, "a", None);
        assert_eq!(tokens.get(&pk, "a"), Some("e1"));
        assert_eq!(tokens.remove(&pk, "a").as_deref(), Some("e1"));
        assert!(tokens.get(&pk, "a").is_none());
    }

    #[test]
    fn test_concurrency_tokens_are_scoped_to_partition() {
        let (p1, p2) = (PartitionKey::from("P1"), PartitionKey::from("P2"));
        let mut tokens = ConcurrencyTokens::default();
        tokens.record(&p1, "a", Some("e1"));
        tokens.record(&p2, "a", Some("e2"));
        assert_eq!(tokens.get(&p1, "a"), Some("e1"));
        assert_eq!(tokens.get(&p2, "a"), Some("e2"));

        tokens.remove(&p2, "a");
        assert_eq!(tokens.get(&p1, "a"), Some("e1"));
    }

    #[test]
    fn test_pending_operations_drain() {
        let mut pending = PendingTransportOperations::default();
        pending.add(TransportOperation::new("42", "somewhere", vec![1]));
        assert_eq!(pending.len(), 1);
        let drained = pending.drain();
        assert_eq!(drained[0].message_id, "42");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_outbox_transaction_adopts_session() {
        let mut ctx = MessageContext::new("m-1", Headers::new());
        ctx.begin_outbox_transaction();
        assert!(ctx.outbox_transaction().is_some());
        assert!(ctx.storage_session_mut().is_empty());
    }
}
