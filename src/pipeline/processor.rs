//! Host adapter that drives one message through the persistence steps.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{MessageContext, Stage, StepRegistry, TransportOperation};
use crate::config::Config;
use crate::error::Result;
use crate::extraction::Extractors;
use crate::interfaces::DocumentStore;
use crate::outbox::{HeaderExtractionStep, LogicalOutboxStep, MessageExtractionStep, OutboxPersister};
use crate::storage::ContainerHolderResolver;

/// Application message handler.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, ctx: &mut MessageContext) -> Result<()>;
}

/// Sends transport operations once the unit of work has committed.
#[async_trait]
pub trait TransportDispatcher: Send + Sync {
    async fn dispatch(&self, operations: &[TransportOperation]) -> Result<()>;
}

/// What processing one message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingOutcome {
    /// False when the outbox found the message already processed.
    pub handler_invoked: bool,
    pub dispatched: Vec<TransportOperation>,
}

/// Runs header steps, outbox deduplication, logical steps, the handler, the
/// commit, and dispatch for one message.
pub struct MessagePipeline {
    steps: StepRegistry,
    resolver: ContainerHolderResolver,
    outbox: Option<OutboxPersister>,
}

impl MessagePipeline {
    /// Register the extraction steps the extractors call for, and the
    /// logical outbox step when the outbox is enabled.
    pub fn new(config: &Config, store: Arc<dyn DocumentStore>, extractors: Extractors) -> Result<Self> {
        let resolver = ContainerHolderResolver::new(
            store,
            config.default_container_information(),
            config.container_override_from_message,
        );
        let configuration = extractors.configuration();
        let extractors = Arc::new(extractors);

        let mut steps = StepRegistry::new();
        if configuration.has_header_extractors {
            steps.register(Arc::new(HeaderExtractionStep::new(extractors.clone())))?;
        }
        if configuration.has_message_extractors {
            steps.register(Arc::new(MessageExtractionStep::new(
                extractors,
                config.container_override_from_message,
            )))?;
        }

        let outbox = if config.outbox.is_enabled() {
            let persister = OutboxPersister::new(resolver.clone(), config.outbox.clone());
            steps.register(Arc::new(LogicalOutboxStep::new(persister.clone())))?;
            Some(persister)
        } else {
            None
        };

        Ok(Self {
            steps,
            resolver,
            outbox,
        })
    }

    pub fn steps(&self) -> &StepRegistry {
        &self.steps
    }

    /// Host steps registered here run after the built-in ones of their stage.
    pub fn steps_mut(&mut self) -> &mut StepRegistry {
        &mut self.steps
    }

    pub fn resolver(&self) -> &ContainerHolderResolver {
        &self.resolver
    }

    pub fn outbox(&self) -> Option<&OutboxPersister> {
        self.outbox.as_ref()
    }

    /// Process one message. The storage session is always disposed, so an
    /// error leaves nothing written except lease releases.
    pub async fn process(
        &self,
        ctx: &mut MessageContext,
        handler: &dyn MessageHandler,
        dispatcher: &dyn TransportDispatcher,
    ) -> Result<ProcessingOutcome> {
        let result = self.run(ctx, handler, dispatcher).await;
        ctx.dispose_storage().await;
        if let Err(e) = &result {
            warn!(message_id = %ctx.message_id(), error = %e, "Message processing failed");
        }
        result
    }

    async fn run(
        &self,
        ctx: &mut MessageContext,
        handler: &dyn MessageHandler,
        dispatcher: &dyn TransportDispatcher,
    ) -> Result<ProcessingOutcome> {
        for step in self.steps.steps(Stage::Header) {
            step.invoke(ctx).await?;
        }

        if let Some(outbox) = &self.outbox {
            ctx.begin_outbox_transaction();
            if ctx.partition_key().is_some() {
                outbox.deduplicate(ctx).await?;
            }
        }

        for step in self.steps.steps(Stage::Logical) {
            if already_handled(ctx) {
                break;
            }
            step.invoke(ctx).await?;
        }

        let handler_invoked = !already_handled(ctx);
        if handler_invoked {
            self.resolver.resolve_and_set_if_available(ctx)?;
            handler.handle(ctx).await?;
            if let Some(outbox) = &self.outbox {
                outbox.store(ctx)?;
            }
        } else {
            debug!(message_id = %ctx.message_id(), "Skipping handler for processed message");
        }

        ctx.commit_storage().await?;

        let dispatched = ctx.pending_operations_mut().drain();
        if !dispatched.is_empty() {
            dispatcher.dispatch(&dispatched).await?;
        }
        if let Some(outbox) = &self.outbox {
            outbox.set_as_dispatched(ctx).await?;
        }

        Ok(ProcessingOutcome {
            handler_invoked,
            dispatched,
        })
    }
}

fn already_handled(ctx: &MessageContext) -> bool {
    ctx.outbox_transaction()
        .is_some_and(|tx| tx.is_already_handled())
}
