//! Named, ordered pipeline steps.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::MessageContext;
use crate::error::{PersistenceError, Result};

/// Pipeline stage a step runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Message bytes received, payload not yet deserialized.
    Header,
    /// Payload deserialized.
    Logical,
}

/// A step the host runs for every incoming message.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Unique step name.
    fn name(&self) -> &str;

    fn stage(&self) -> Stage;

    async fn invoke(&self, ctx: &mut MessageContext) -> Result<()>;
}

/// Steps per stage, in registration order.
#[derive(Default)]
pub struct StepRegistry {
    header: Vec<Arc<dyn PipelineStep>>,
    logical: Vec<Arc<dyn PipelineStep>>,
    names: HashSet<String>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step to its stage. Names must be unique across stages.
    pub fn register(&mut self, step: Arc<dyn PipelineStep>) -> Result<()> {
        if !self.names.insert(step.name().to_string()) {
            return Err(PersistenceError::Configuration(format!(
                "A pipeline step named '{}' is already registered",
                step.name()
            )));
        }
        match step.stage() {
            Stage::Header => self.header.push(step),
            Stage::Logical => self.logical.push(step),
        }
        Ok(())
    }

    pub fn steps(&self, stage: Stage) -> &[Arc<dyn PipelineStep>] {
        match stage {
            Stage::Header => &self.header,
            Stage::Logical => &self.logical,
        }
    }

    pub fn names(&self, stage: Stage) -> Vec<&str> {
        self.steps(stage).iter().map(|s| s.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}
