//! Host pipeline boundary: the per-message context and the steps that run
//! against it.

mod context;
mod processor;
mod step;

pub use context::{
    ConcurrencyTokens, Headers, MessageContext, PendingTransportOperations, TransportOperation,
};
pub use processor::{MessageHandler, MessagePipeline, ProcessingOutcome, TransportDispatcher};
pub use step::{PipelineStep, Stage, StepRegistry};
