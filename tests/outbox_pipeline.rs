//! End-to-end outbox deduplication through the message pipeline.

mod common;

use std::any::Any;

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use batchstore::error::{PersistenceError, Result};
use batchstore::extraction::Extractors;
use batchstore::partition::PartitionKey;
use batchstore::pipeline::{Headers, MessageContext, MessageHandler};

use common::*;

#[tokio::test]
async fn test_redelivery_replays_recorded_operations() {
    let fixture = Fixture::new(true, false).await;
    fixture.seed_outbox_record("m-1", "P1").await;
    let pipeline = fixture.pipeline(tenant_extractors());
    let handler = OrderHandler::default();
    let dispatcher = RecordingDispatcher::default();

    let mut ctx = tenant_message("m-1", "P1");
    let outcome = pipeline.process(&mut ctx, &handler, &dispatcher).await.unwrap();

    assert!(!outcome.handler_invoked);
    assert_eq!(handler.invocations(), 0);
    assert_eq!(outcome.dispatched.len(), 1);
    assert_eq!(outcome.dispatched[0].message_id, "42");
    assert_eq!(outcome.dispatched[0].destination, "somewhere");
    assert_eq!(dispatcher.dispatched().len(), 1);

    let record = fixture
        .container
        .get_item("m-1", &PartitionKey::from("P1"))
        .await
        .unwrap();
    assert_eq!(record["dispatched"], true);
    assert_eq!(record["ttl"], 3600);
    assert!(fixture
        .container
        .get_item("item-m-1", &PartitionKey::from("P1"))
        .await
        .is_none());
}

#[tokio::test]
async fn test_first_delivery_commits_record_with_handler_writes() {
    let fixture = Fixture::new(true, false).await;
    let pipeline = fixture.pipeline(tenant_extractors());
    let handler = OrderHandler::default();
    let dispatcher = RecordingDispatcher::default();

    let mut ctx = tenant_message("m-1", "P1");
    let outcome = pipeline.process(&mut ctx, &handler, &dispatcher).await.unwrap();

    assert!(outcome.handler_invoked);
    assert_eq!(outcome.dispatched[0].message_id, "out-m-1");

    let batches = fixture.container.executed_batches().await;
    // The unit of work, then the dispatch completion.
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].partition_key(), &PartitionKey::from("P1"));
    let verbs: Vec<_> = batches[0].operations().iter().map(|op| op.verb()).collect();
    assert_eq!(verbs, vec!["create", "create"]);
    assert_eq!(batches[1].operations()[0].verb(), "upsert");

    let item = fixture
        .container
        .get_item("item-m-1", &PartitionKey::from("P1"))
        .await
        .unwrap();
    assert_eq!(item["tenant"], "P1");
}

#[tokio::test]
async fn test_redelivery_after_dispatch_dispatches_nothing() {
    let fixture = Fixture::new(true, false).await;
    let pipeline = fixture.pipeline(tenant_extractors());
    let handler = OrderHandler::default();
    let dispatcher = RecordingDispatcher::default();

    let mut first = tenant_message("m-1", "P1");
    assert_ok!(pipeline.process(&mut first, &handler, &dispatcher).await);
    let batches_after_first = fixture.container.executed_batches().await.len();

    let mut second = tenant_message("m-1", "P1");
    let outcome = pipeline.process(&mut second, &handler, &dispatcher).await.unwrap();

    assert!(!outcome.handler_invoked);
    assert!(outcome.dispatched.is_empty());
    assert_eq!(handler.invocations(), 1);
    assert_eq!(dispatcher.dispatched().len(), 1);
    assert_eq!(
        fixture.container.executed_batches().await.len(),
        batches_after_first
    );
}

#[tokio::test]
async fn test_legacy_record_found_and_completed_under_fallback_key() {
    let fixture = Fixture::new(true, true).await;
    fixture.seed_outbox_record("m-1", "m-1").await;
    let pipeline = fixture.pipeline(tenant_extractors());
    let handler = OrderHandler::default();
    let dispatcher = RecordingDispatcher::default();

    let mut ctx = tenant_message("m-1", "P1");
    let outcome = pipeline.process(&mut ctx, &handler, &dispatcher).await.unwrap();

    assert!(!outcome.handler_invoked);
    assert_eq!(outcome.dispatched[0].message_id, "42");

    let legacy = fixture
        .container
        .get_item("m-1", &PartitionKey::from("m-1"))
        .await
        .unwrap();
    assert_eq!(legacy["dispatched"], true);
    assert!(fixture
        .container
        .get_item("m-1", &PartitionKey::from("P1"))
        .await
        .is_none());
}

struct OrderPlaced {
    tenant: String,
}

#[tokio::test]
async fn test_logical_stage_deduplicates_when_headers_carry_no_key() {
    let fixture = Fixture::new(true, false).await;
    fixture.seed_outbox_record("m-1", "P7").await;

    let mut extractors = Extractors::new();
    extractors
        .partition_keys
        .extract_from_message::<OrderPlaced, _>(|m, _| Some(PartitionKey::from(m.tenant.as_str())))
        .unwrap();
    let pipeline = fixture.pipeline(extractors);
    let handler = OrderHandler::default();
    let dispatcher = RecordingDispatcher::default();

    let mut ctx = MessageContext::new("m-1", Headers::new()).with_message(OrderPlaced {
        tenant: "P7".into(),
    });
    let outcome = pipeline.process(&mut ctx, &handler, &dispatcher).await.unwrap();

    assert!(!outcome.handler_invoked);
    assert_eq!(outcome.dispatched[0].message_id, "42");
}

#[tokio::test]
async fn test_outbox_without_partition_key_fails_with_remedy() {
    let fixture = Fixture::new(true, false).await;
    let pipeline = fixture.pipeline(Extractors::new());
    let handler = OrderHandler::default();
    let dispatcher = RecordingDispatcher::default();

    let mut ctx = MessageContext::new("m-1", Headers::new());
    let err = pipeline
        .process(&mut ctx, &handler, &dispatcher)
        .await
        .unwrap_err();

    assert!(matches!(err, PersistenceError::MissingPartitionKey { .. }));
    assert!(err.to_string().contains("extract_from_header"));
    assert_eq!(handler.invocations(), 0);
}

struct FailingHandler;

#[async_trait]
impl MessageHandler for FailingHandler {
    async fn handle(&self, ctx: &mut MessageContext) -> Result<()> {
        ctx.synchronized_storage()
            .create_item(serde_json::json!({ "id": "never-written" }))?;
        Err(PersistenceError::Configuration("handler failed".into()))
    }
}

#[tokio::test]
async fn test_failed_handler_writes_nothing() {
    let fixture = Fixture::new(true, false).await;
    let pipeline = fixture.pipeline(tenant_extractors());
    let dispatcher = RecordingDispatcher::default();

    let mut ctx = tenant_message("m-1", "P1");
    assert_err!(pipeline.process(&mut ctx, &FailingHandler, &dispatcher).await);

    assert!(fixture.container.executed_batches().await.is_empty());
    assert_eq!(fixture.container.item_count().await, 0);
    assert!(dispatcher.dispatched().is_empty());
}

#[tokio::test]
async fn test_message_type_is_visible_to_handlers() {
    struct Inspect;

    #[async_trait]
    impl MessageHandler for Inspect {
        async fn handle(&self, ctx: &mut MessageContext) -> Result<()> {
            let message: &dyn Any = ctx.message().unwrap();
            assert!(message.downcast_ref::<OrderPlaced>().is_some());
            Ok(())
        }
    }

    let fixture = Fixture::new(false, false).await;
    let pipeline = fixture.pipeline(Extractors::new());
    let mut ctx = MessageContext::new("m-1", Headers::new()).with_message(OrderPlaced {
        tenant: "P1".into(),
    });
    assert_ok!(
        pipeline
            .process(&mut ctx, &Inspect, &RecordingDispatcher::default())
            .await
    );
}
