//! Container resolution for the current message.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::interfaces::DocumentStore;
use crate::partition::{ContainerHolder, ContainerInformation};
use crate::pipeline::MessageContext;

/// Resolves which container the current message's operations target.
///
/// Resolved holders are cached in the [`MessageContext`], so repeated
/// resolution within one message returns the cached holder.
#[derive(Clone)]
pub struct ContainerHolderResolver {
    store: Arc<dyn DocumentStore>,
    default_container: Option<ContainerInformation>,
    container_override_from_message: bool,
}

impl ContainerHolderResolver {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        default_container: Option<ContainerInformation>,
        container_override_from_message: bool,
    ) -> Self {
        Self {
            store,
            default_container,
            container_override_from_message,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn default_container(&self) -> Option<&ContainerInformation> {
        self.default_container.as_ref()
    }

    /// Resolve the container holder and cache it into the context.
    ///
    /// Order:
    /// 1. A cached holder is replaced by the extracted container only when
    ///    `container_override_from_message` is set and the names differ.
    /// 2. Otherwise a cached holder is returned unchanged.
    /// 3. Otherwise the extracted container, then the default container.
    ///
    /// Returns `Ok(None)` when no container can be determined.
    pub fn resolve_and_set_if_available(
        &self,
        ctx: &mut MessageContext,
    ) -> Result<Option<ContainerHolder>> {
        if let Some(held) = ctx.container_holder() {
            let replacement = match ctx.container_information() {
                Some(info)
                    if self.container_override_from_message
                        && info.container_name != held.name() =>
                {
                    Some(info.clone())
                }
                _ => None,
            };
            let Some(info) = replacement else {
                return Ok(Some(held.clone()));
            };
            debug!(
                message_id = %ctx.message_id(),
                from = %held.name(),
                to = %info.container_name,
                "Overriding container from message"
            );
            let holder = self.holder_for(&info)?;
            ctx.set_container_holder(holder.clone());
            return Ok(Some(holder));
        }

        let info = match ctx
            .container_information()
            .or(self.default_container.as_ref())
        {
            Some(info) => info.clone(),
            None => return Ok(None),
        };

        let holder = self.holder_for(&info)?;
        debug!(
            message_id = %ctx.message_id(),
            container = %holder.name(),
            "Resolved container"
        );
        ctx.set_container_holder(holder.clone());
        Ok(Some(holder))
    }

    fn holder_for(&self, info: &ContainerInformation) -> Result<ContainerHolder> {
        let container = self.store.container(&info.container_name)?;
        Ok(ContainerHolder::new(
            container,
            info.partition_key_path.clone(),
        ))
    }
}
