//! Saga persister.

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{locking, SagaData, SagaIdGenerator};
use crate::config::SagaConfig;
use crate::error::{PersistenceError, Result};
use crate::operations::{
    ReleaseLockOperation, SagaDeleteOperation, SagaSaveOperation, SagaUpdateOperation,
};
use crate::pipeline::MessageContext;
use crate::storage::ContainerHolderResolver;

/// Maps saga lifecycle calls onto storage operations of the current message.
///
/// Writes are queued into the message's storage session and happen at commit.
/// Reads are point reads that record the document's ETag, which later
/// guards update and complete.
#[derive(Clone)]
pub struct SagaPersister {
    resolver: ContainerHolderResolver,
    config: SagaConfig,
}

impl SagaPersister {
    pub fn new(resolver: ContainerHolderResolver, config: SagaConfig) -> Self {
        Self { resolver, config }
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Queue creation of a new saga.
    pub fn save<T: SagaData>(&self, ctx: &mut MessageContext, saga: &T) -> Result<()> {
        let partition_key = ctx.required_partition_key()?.clone();
        let id = saga.id().to_string();
        let document = saga_document(saga, &id)?;
        ctx.storage_session_mut().add(SagaSaveOperation::new(
            T::ENTITY_TYPE,
            id,
            partition_key,
            document,
        ));
        Ok(())
    }

    /// Queue a replace of a saga read earlier in this message.
    pub fn update<T: SagaData>(&self, ctx: &mut MessageContext, saga: &T) -> Result<()> {
        let partition_key = ctx.required_partition_key()?.clone();
        let id = saga.id().to_string();
        let document = saga_document(saga, &id)?;
        let if_match = ctx
            .concurrency_tokens()
            .get(&partition_key, &id)
            .map(str::to_string);
        ctx.storage_session_mut().add(SagaUpdateOperation::new(
            T::ENTITY_TYPE,
            id,
            partition_key,
            document,
            if_match,
        ));
        Ok(())
    }

    /// Queue deletion of a completed saga.
    pub fn complete<T: SagaData>(&self, ctx: &mut MessageContext, saga: &T) -> Result<()> {
        let partition_key = ctx.required_partition_key()?.clone();
        let id = saga.id().to_string();
        let if_match = ctx
            .concurrency_tokens()
            .get(&partition_key, &id)
            .map(str::to_string);
        ctx.storage_session_mut().add(SagaDeleteOperation::new(
            T::ENTITY_TYPE,
            id,
            partition_key,
            if_match,
        ));
        Ok(())
    }

    /// Read a saga by id. `Ok(None)` when it does not exist.
    ///
    /// With pessimistic locking the document is leased first, and a lease
    /// release is queued for the case the message does not commit.
    pub async fn get<T: SagaData>(
        &self,
        ctx: &mut MessageContext,
        saga_id: Uuid,
    ) -> Result<Option<T>> {
        let partition_key = ctx.required_partition_key()?.clone();
        let holder = self
            .resolver
            .resolve_and_set_if_available(ctx)?
            .ok_or(PersistenceError::MissingContainer)?;
        let id = saga_id.to_string();
        let cancel = ctx.cancellation().clone();
        let container = holder.container().as_ref();

        let item = if self.config.pessimistic_locking {
            let leased =
                locking::acquire_lease(container, &id, &partition_key, &self.config, &cancel)
                    .await?;
            if let Some(item) = &leased {
                ctx.storage_session_mut().add(ReleaseLockOperation::new(
                    id.clone(),
                    partition_key.clone(),
                    Some(item.etag.clone()),
                ));
            }
            leased
        } else {
            container.read_item(&id, &partition_key, &cancel).await?
        };

        let Some(item) = item else {
            debug!(saga_id = %id, entity_type = T::ENTITY_TYPE, "Saga not found");
            return Ok(None);
        };
        ctx.concurrency_tokens_mut()
            .record(&partition_key, &id, Some(&item.etag));
        Ok(Some(serde_json::from_value(item.document)?))
    }

    /// Read a saga by its correlation property.
    pub async fn get_by_property<T: SagaData>(
        &self,
        ctx: &mut MessageContext,
        property_name: &str,
        property_value: impl std::fmt::Display,
    ) -> Result<Option<T>> {
        let saga_id = SagaIdGenerator::generate(T::ENTITY_TYPE, property_name, property_value);
        self.get(ctx, saga_id).await
    }
}

fn saga_document<T: SagaData>(saga: &T, id: &str) -> Result<Value> {
    let mut document = serde_json::to_value(saga)?;
    if let Some(object) = document.as_object_mut() {
        object.insert("id".to_string(), Value::String(id.to_string()));
    }
    Ok(document)
}
