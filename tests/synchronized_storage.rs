//! Handler-owned writes grouped by partition key, and saga persistence
//! through the pipeline.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use batchstore::error::{PersistenceError, Result};
use batchstore::interfaces::BatchOperation;
use batchstore::operations::CreateItemOperation;
use batchstore::partition::PartitionKey;
use batchstore::pipeline::{MessageContext, MessageHandler};
use batchstore::saga::{SagaData, SagaIdGenerator, SagaPersister};
use batchstore::storage::{ContainerHolderResolver, InMemoryContainer};

use common::*;

struct CrossPartitionHandler;

#[async_trait]
impl MessageHandler for CrossPartitionHandler {
    async fn handle(&self, ctx: &mut MessageContext) -> Result<()> {
        let session = ctx.storage_session_mut();
        session.add(CreateItemOperation::new(
            PartitionKey::from("P1"),
            json!({"id": "first"}),
        ));
        session.add(CreateItemOperation::new(
            PartitionKey::from("P2"),
            json!({"id": "other"}),
        ));
        session.add(CreateItemOperation::new(
            PartitionKey::from("P1"),
            json!({"id": "second"}),
        ));
        Ok(())
    }
}

fn created_id(operation: &BatchOperation) -> &str {
    match operation {
        BatchOperation::Create { document } => document["id"].as_str().unwrap(),
        other => panic!("unexpected operation {other:?}"),
    }
}

#[tokio::test]
async fn test_one_grouped_write_per_partition_key() {
    let fixture = Fixture::new(false, false).await;
    let pipeline = fixture.pipeline(tenant_extractors());

    let mut ctx = tenant_message("m-1", "P1");
    pipeline
        .process(&mut ctx, &CrossPartitionHandler, &RecordingDispatcher::default())
        .await
        .unwrap();

    let batches = fixture.container.executed_batches().await;
    assert_eq!(batches.len(), 2);

    assert_eq!(batches[0].partition_key(), &PartitionKey::from("P1"));
    let ids: Vec<_> = batches[0].operations().iter().map(created_id).collect();
    assert_eq!(ids, vec!["first", "second"]);

    assert_eq!(batches[1].partition_key(), &PartitionKey::from("P2"));
    assert_eq!(batches[1].len(), 1);

    let other = fixture
        .container
        .get_item("other", &PartitionKey::from("P2"))
        .await
        .unwrap();
    assert_eq!(other["tenant"], "P2");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ShippingSaga {
    id: Uuid,
    order_id: String,
    packages: u32,
}

impl SagaData for ShippingSaga {
    const ENTITY_TYPE: &'static str = "ShippingSaga";

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Starts or advances the shipping saga for order `o-1`. When `interfere` is
/// set, another writer changes the saga between read and update.
struct ShippingHandler {
    sagas: SagaPersister,
    container: Arc<InMemoryContainer>,
    interfere: bool,
}

#[async_trait]
impl MessageHandler for ShippingHandler {
    async fn handle(&self, ctx: &mut MessageContext) -> Result<()> {
        let found: Option<ShippingSaga> =
            self.sagas.get_by_property(ctx, "order_id", "o-1").await?;
        match found {
            None => {
                let saga = ShippingSaga {
                    id: SagaIdGenerator::generate(ShippingSaga::ENTITY_TYPE, "order_id", "o-1"),
                    order_id: "o-1".into(),
                    packages: 1,
                };
                self.sagas.save(ctx, &saga)
            }
            Some(mut saga) => {
                if self.interfere {
                    let mut rewritten = serde_json::to_value(&saga).unwrap();
                    rewritten["tenant"] = json!("P1");
                    rewritten["packages"] = json!(99);
                    self.container
                        .insert_item(rewritten, PartitionKey::from("P1"))
                        .await;
                }
                saga.packages += 1;
                self.sagas.update(ctx, &saga)
            }
        }
    }
}

#[tokio::test]
async fn test_saga_lifecycle_and_concurrent_update() {
    let fixture = Fixture::new(true, false).await;
    let pipeline = fixture.pipeline(tenant_extractors());
    let sagas = SagaPersister::new(
        ContainerHolderResolver::new(
            fixture.store.clone(),
            fixture.config.default_container_information(),
            false,
        ),
        fixture.config.saga.clone(),
    );
    let saga_id = SagaIdGenerator::generate(ShippingSaga::ENTITY_TYPE, "order_id", "o-1");
    let dispatcher = RecordingDispatcher::default();

    let start = ShippingHandler {
        sagas: sagas.clone(),
        container: fixture.container.clone(),
        interfere: false,
    };
    pipeline
        .process(&mut tenant_message("m-1", "P1"), &start, &dispatcher)
        .await
        .unwrap();
    pipeline
        .process(&mut tenant_message("m-2", "P1"), &start, &dispatcher)
        .await
        .unwrap();

    let stored = fixture
        .container
        .get_item(&saga_id.to_string(), &PartitionKey::from("P1"))
        .await
        .unwrap();
    assert_eq!(stored["packages"], 2);

    let racing = ShippingHandler {
        interfere: true,
        ..start
    };
    let err = pipeline
        .process(&mut tenant_message("m-3", "P1"), &racing, &dispatcher)
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::SagaConcurrency { .. }));

    // Neither the saga update nor the outbox record of m-3 was written.
    let stored = fixture
        .container
        .get_item(&saga_id.to_string(), &PartitionKey::from("P1"))
        .await
        .unwrap();
    assert_eq!(stored["packages"], 99);
    assert!(fixture
        .container
        .get_item("m-3", &PartitionKey::from("P1"))
        .await
        .is_none());
}
