//! Pipeline steps that make outbox deduplication partition-aware.
//!
//! The extraction steps run ahead of the outbox check at each stage and put
//! the partition key and container into the context. The logical outbox step
//! runs the check when the header stage could not.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::OutboxPersister;
use crate::error::Result;
use crate::extraction::Extractors;
use crate::pipeline::{MessageContext, PipelineStep, Stage};

/// Header-stage extraction.
pub struct HeaderExtractionStep {
    extractors: Arc<Extractors>,
}

impl HeaderExtractionStep {
    pub const NAME: &'static str = "partition-header-extraction";

    pub fn new(extractors: Arc<Extractors>) -> Self {
        Self { extractors }
    }
}

#[async_trait]
impl PipelineStep for HeaderExtractionStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn stage(&self) -> Stage {
        Stage::Header
    }

    async fn invoke(&self, ctx: &mut MessageContext) -> Result<()> {
        let partition_key = self
            .extractors
            .partition_keys
            .try_extract_from_headers(ctx.headers());
        let container = self
            .extractors
            .containers
            .try_extract_from_headers(ctx.headers());

        if let Some(pk) = partition_key {
            debug!(message_id = %ctx.message_id(), partition_key = %pk, "Partition key from headers");
            ctx.set_partition_key(pk);
        }
        if let Some(info) = container {
            debug!(message_id = %ctx.message_id(), container = %info, "Container from headers");
            ctx.set_container_information(info);
        }
        Ok(())
    }
}

/// Logical-stage extraction from the deserialized message.
///
/// A partition key found here replaces the one from headers, unless the
/// outbox transaction is already bound to the header key: the outbox record
/// and the handler's writes must share one grouped write. A container found
/// here is only taken when headers supplied none, or when
/// `container_override_from_message` is set.
pub struct MessageExtractionStep {
    extractors: Arc<Extractors>,
    container_override_from_message: bool,
}

impl MessageExtractionStep {
    pub const NAME: &'static str = "partition-message-extraction";

    pub fn new(extractors: Arc<Extractors>, container_override_from_message: bool) -> Self {
        Self {
            extractors,
            container_override_from_message,
        }
    }
}

#[async_trait]
impl PipelineStep for MessageExtractionStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn stage(&self) -> Stage {
        Stage::Logical
    }

    async fn invoke(&self, ctx: &mut MessageContext) -> Result<()> {
        let (partition_key, container) = {
            let Some(message) = ctx.message() else {
                return Ok(());
            };
            let message: &dyn Any = message;
            (
                self.extractors
                    .partition_keys
                    .try_extract_from_message(message, ctx.headers()),
                self.extractors
                    .containers
                    .try_extract_from_message(message, ctx.headers()),
            )
        };

        if let Some(pk) = partition_key {
            let bound = ctx
                .outbox_transaction()
                .and_then(|tx| tx.partition_key())
                .cloned();
            match bound {
                Some(bound) if bound != pk => {
                    warn!(
                        message_id = %ctx.message_id(),
                        bound = %bound,
                        extracted = %pk,
                        "Keeping the partition key the outbox record is bound to"
                    );
                }
                Some(_) => {}
                None => {
                    debug!(message_id = %ctx.message_id(), partition_key = %pk, "Partition key from message");
                    ctx.set_partition_key(pk);
                }
            }
        }

        if let Some(info) = container {
            if ctx.container_information().is_none() || self.container_override_from_message {
                debug!(message_id = %ctx.message_id(), container = %info, "Container from message");
                ctx.set_container_information(info);
            } else {
                debug!(
                    message_id = %ctx.message_id(),
                    ignored = %info,
                    "Keeping container from headers"
                );
            }
        }
        Ok(())
    }
}

/// Runs deduplication at the logical stage when the header stage did not.
pub struct LogicalOutboxStep {
    persister: OutboxPersister,
}

impl LogicalOutboxStep {
    pub const NAME: &'static str = "logical-outbox";

    pub fn new(persister: OutboxPersister) -> Self {
        Self { persister }
    }
}

#[async_trait]
impl PipelineStep for LogicalOutboxStep {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn stage(&self) -> Stage {
        Stage::Logical
    }

    async fn invoke(&self, ctx: &mut MessageContext) -> Result<()> {
        match ctx.outbox_transaction() {
            None => return Ok(()),
            Some(tx) if tx.partition_key().is_some() => return Ok(()),
            Some(_) => {}
        }
        self.persister.deduplicate(ctx).await?;
        Ok(())
    }
}
