//! Storage: container resolution, the per-message batching engine, and the
//! in-memory document store.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::interfaces::DocumentStore;

pub mod installer;
pub mod memory;
mod resolver;
mod session;
mod synchronized;

pub use memory::{InMemoryContainer, InMemoryDocumentStore};
pub use resolver::ContainerHolderResolver;
pub use session::{PartitionedOperations, StorageSession};
pub use synchronized::SynchronizedStorageSession;

/// Build the in-memory store and provision it per configuration.
///
/// Hosts with a real backend construct their own [`DocumentStore`] and call
/// [`installer::install`] directly.
pub async fn init_storage(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    info!(database = %config.database_name, "Storage: in-memory");
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    installer::install(config, store.as_ref()).await?;
    Ok(store)
}
