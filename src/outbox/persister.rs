//! Outbox deduplication against the partitioned store.

use tracing::{debug, info};

use super::{OutboxRecord, OUTBOX_ENTITY_TYPE};
use crate::config::OutboxConfig;
use crate::error::{PersistenceError, Result};
use crate::operations::{OutboxDeleteOperation, OutboxStoreOperation};
use crate::partition::{ContainerHolder, PartitionKey};
use crate::pipeline::MessageContext;
use crate::storage::{ContainerHolderResolver, StorageSession};

/// Reads, stores, and completes outbox records for the current message.
#[derive(Clone)]
pub struct OutboxPersister {
    resolver: ContainerHolderResolver,
    config: OutboxConfig,
}

impl OutboxPersister {
    pub fn new(resolver: ContainerHolderResolver, config: OutboxConfig) -> Self {
        Self { resolver, config }
    }

    pub fn config(&self) -> &OutboxConfig {
        &self.config
    }

    /// Read the record for the current message.
    ///
    /// Requires a partition key and a container. Binds the partition key to
    /// the outbox transaction. With `read_fallback_enabled`, a miss under the
    /// resolved key is retried under the legacy key (the raw message id); a
    /// hit there redirects dispatch completion to that key.
    pub async fn get(&self, ctx: &mut MessageContext) -> Result<Option<OutboxRecord>> {
        let partition_key = ctx.required_partition_key()?.clone();
        let holder = self.required_holder(ctx)?;
        let message_id = ctx.message_id().to_string();
        let cancel = ctx.cancellation().clone();

        if let Some(tx) = ctx.outbox_transaction_mut() {
            tx.bind_partition_key(partition_key.clone());
        }

        let container = holder.container();
        if let Some(item) = container
            .read_item(&message_id, &partition_key, &cancel)
            .await?
        {
            return Ok(Some(serde_json::from_value(item.document)?));
        }

        if !self.config.read_fallback_enabled {
            return Ok(None);
        }

        let legacy_key = PartitionKey::from(message_id.as_str());
        if legacy_key == partition_key {
            return Ok(None);
        }
        let Some(item) = container.read_item(&message_id, &legacy_key, &cancel).await? else {
            return Ok(None);
        };

        debug!(
            message_id = %message_id,
            partition_key = %legacy_key,
            "Outbox record found under legacy partition key"
        );
        if let Some(tx) = ctx.outbox_transaction_mut() {
            tx.use_fallback_partition_key(legacy_key);
        }
        Ok(Some(serde_json::from_value(item.document)?))
    }

    /// Run the deduplication check.
    ///
    /// On a hit the transaction is marked handled and the pending transport
    /// operations are replaced by the recorded ones. Returns whether the
    /// message was already handled.
    pub async fn deduplicate(&self, ctx: &mut MessageContext) -> Result<bool> {
        let Some(record) = self.get(ctx).await? else {
            return Ok(false);
        };

        let replayed = record.transport_operations();
        info!(
            message_id = %ctx.message_id(),
            operations = replayed.len(),
            dispatched = record.dispatched,
            "Message already processed; replaying recorded transport operations"
        );
        if let Some(tx) = ctx.outbox_transaction_mut() {
            tx.mark_already_handled(record.dispatched);
        }
        let pending = ctx.pending_operations_mut();
        pending.clear();
        pending.extend(replayed);
        Ok(true)
    }

    /// Queue the outbox record into the message's unit of work.
    ///
    /// A no-op when no transaction is open or the message was already handled.
    pub fn store(&self, ctx: &mut MessageContext) -> Result<()> {
        let partition_key = match ctx.outbox_transaction() {
            None => return Ok(()),
            Some(tx) if tx.is_already_handled() => return Ok(()),
            Some(tx) => match tx.partition_key() {
                Some(pk) => pk.clone(),
                None => ctx.required_partition_key()?.clone(),
            },
        };

        let record = OutboxRecord::pending(ctx.message_id(), ctx.pending_operations().operations());
        let document = serde_json::to_value(&record)?;
        let operation = OutboxStoreOperation::new(ctx.message_id(), partition_key, document);
        ctx.storage_session_mut().add(operation);
        Ok(())
    }

    /// Mark the record dispatched and let it expire after the configured
    /// deduplication retention.
    ///
    /// Runs as its own grouped write after the message's unit of work has
    /// committed. Skipped when the stored record already says dispatched.
    pub async fn set_as_dispatched(&self, ctx: &mut MessageContext) -> Result<()> {
        let partition_key = match ctx.outbox_transaction() {
            None => return Ok(()),
            Some(tx) if tx.is_record_dispatched() => return Ok(()),
            Some(tx) => match tx.dispatch_partition_key() {
                Some(pk) => pk.clone(),
                None => ctx.required_partition_key()?.clone(),
            },
        };
        let holder = self.required_holder(ctx)?;

        let ttl = i64::try_from(self.config.time_to_keep_deduplication_data_secs).map_err(|_| {
            PersistenceError::Configuration(
                "`time_to_keep_deduplication_data_secs` is out of range".to_string(),
            )
        })?;
        let record = OutboxRecord::dispatched(ctx.message_id(), ttl);
        let document = serde_json::to_value(&record)?;

        let mut session = StorageSession::new();
        session.add(OutboxDeleteOperation::new(
            ctx.message_id(),
            partition_key.clone(),
            document,
        ));
        let cancel = ctx.cancellation().clone();
        session
            .commit(Some(&holder), ctx.concurrency_tokens_mut(), &cancel)
            .await?;

        debug!(
            message_id = %ctx.message_id(),
            partition_key = %partition_key,
            entity_type = OUTBOX_ENTITY_TYPE,
            "Outbox record marked dispatched"
        );
        Ok(())
    }

    fn required_holder(&self, ctx: &mut MessageContext) -> Result<ContainerHolder> {
        self.resolver
            .resolve_and_set_if_available(ctx)?
            .ok_or(PersistenceError::MissingContainer)
    }
}
