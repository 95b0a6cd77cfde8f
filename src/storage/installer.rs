//! Container provisioning.

use tracing::info;

use crate::config::Config;
use crate::error::{PersistenceError, Result};
use crate::interfaces::DocumentStore;

/// Create the default container if provisioning is enabled.
///
/// A no-op unless `create_containers` is set. Fails with a configuration
/// error when provisioning is enabled but no default container is configured.
pub async fn install(config: &Config, store: &dyn DocumentStore) -> Result<()> {
    if !config.create_containers {
        return Ok(());
    }

    let info = config.default_container_information().ok_or_else(|| {
        PersistenceError::Configuration(
            "`create_containers` is enabled but no `default_container` is configured".to_string(),
        )
    })?;

    store.create_container_if_not_exists(&info).await?;
    info!(
        database = %config.database_name,
        container = %info.container_name,
        partition_key_path = %info.partition_key_path,
        "Container ready"
    );
    Ok(())
}
