//! Shared fixtures for integration tests.
//!
//! Builds pipelines against the in-memory store with an `orders` container
//! partitioned on `/tenant`.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use batchstore::config::Config;
use batchstore::error::Result;
use batchstore::extraction::Extractors;
use batchstore::interfaces::DocumentStore;
use batchstore::partition::{ContainerInformation, PartitionKey, PartitionKeyPath};
use batchstore::pipeline::{
    Headers, MessageContext, MessageHandler, MessagePipeline, TransportDispatcher,
    TransportOperation,
};
use batchstore::storage::{InMemoryContainer, InMemoryDocumentStore};

pub const CONTAINER: &str = "orders";
pub const PARTITION_KEY_PATH: &str = "/tenant";
pub const TENANT_HEADER: &str = "tenant";

pub struct Fixture {
    pub store: Arc<InMemoryDocumentStore>,
    pub container: Arc<InMemoryContainer>,
    pub config: Config,
}

impl Fixture {
    pub async fn new(outbox_enabled: bool, read_fallback_enabled: bool) -> Self {
        let store = Arc::new(InMemoryDocumentStore::new());
        let info = ContainerInformation::new(
            CONTAINER,
            PartitionKeyPath::parse(PARTITION_KEY_PATH).unwrap(),
        );
        store.create_container_if_not_exists(&info).await.unwrap();
        let container = store.in_memory_container(CONTAINER).unwrap();

        let mut config = Config::default()
            .with_default_container(CONTAINER, PARTITION_KEY_PATH)
            .unwrap();
        config.outbox.enabled = outbox_enabled;
        config.outbox.read_fallback_enabled = read_fallback_enabled;
        config.outbox.time_to_keep_deduplication_data_secs = 3600;

        Self {
            store,
            container,
            config,
        }
    }

    pub fn pipeline(&self, extractors: Extractors) -> MessagePipeline {
        let store: Arc<dyn DocumentStore> = self.store.clone();
        MessagePipeline::new(&self.config, store, extractors).unwrap()
    }

    /// Seed an undispatched outbox record holding one transport operation.
    pub async fn seed_outbox_record(&self, message_id: &str, partition_key: &str) {
        self.container
            .insert_item(
                json!({
                    "id": message_id,
                    "tenant": partition_key,
                    "dispatched": false,
                    "transport_operations": [
                        {"message_id": "42", "destination": "somewhere", "body": ""}
                    ]
                }),
                PartitionKey::from(partition_key),
            )
            .await;
    }
}

/// Extractors reading the partition key from the tenant header.
pub fn tenant_extractors() -> Extractors {
    let mut extractors = Extractors::new();
    extractors
        .partition_keys
        .extract_from_header_key(TENANT_HEADER)
        .unwrap();
    extractors
}

pub fn headers(pairs: &[(&str, &str)]) -> Headers {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn tenant_message(message_id: &str, tenant: &str) -> MessageContext {
    MessageContext::new(message_id, headers(&[(TENANT_HEADER, tenant)]))
}

/// Records every dispatched transport operation.
#[derive(Default)]
pub struct RecordingDispatcher {
    dispatched: Mutex<Vec<TransportOperation>>,
}

impl RecordingDispatcher {
    pub fn dispatched(&self) -> Vec<TransportOperation> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportDispatcher for RecordingDispatcher {
    async fn dispatch(&self, operations: &[TransportOperation]) -> Result<()> {
        self.dispatched
            .lock()
            .unwrap()
            .extend(operations.iter().cloned());
        Ok(())
    }
}

/// Writes an item named after the message and emits one transport
/// operation. Counts invocations.
#[derive(Default)]
pub struct OrderHandler {
    invocations: AtomicUsize,
}

impl OrderHandler {
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for OrderHandler {
    async fn handle(&self, ctx: &mut MessageContext) -> Result<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let item_id = format!("item-{}", ctx.message_id());
        ctx.synchronized_storage()
            .create_item(json!({ "id": item_id, "kind": "order" }))?;
        let outgoing = TransportOperation::new(
            format!("out-{}", ctx.message_id()),
            "billing",
            b"{}".to_vec(),
        );
        ctx.pending_operations_mut().add(outgoing);
        Ok(())
    }
}
