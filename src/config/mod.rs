//! Persistence configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod outbox;
mod saga;

pub use outbox::{OutboxConfig, DEFAULT_DEDUPLICATION_TTL_SECS};
pub use saga::SagaConfig;

use serde::Deserialize;

use crate::error::Result;
use crate::partition::{ContainerInformation, PartitionKeyPath};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "batchstore.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "BATCHSTORE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "BATCHSTORE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "BATCHSTORE_LOG";
/// Environment variable for outbox enablement.
pub const OUTBOX_ENABLED_ENV_VAR: &str = "BATCHSTORE_OUTBOX_ENABLED";

/// Default container used when no container is supplied by the pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfig {
    pub name: String,
    pub partition_key_path: PartitionKeyPath,
}

impl From<ContainerConfig> for ContainerInformation {
    fn from(config: ContainerConfig) -> Self {
        ContainerInformation::new(config.name, config.partition_key_path)
    }
}

/// Main persistence configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database holding the containers.
    pub database_name: String,
    /// Container used when extractors supply none.
    pub default_container: Option<ContainerConfig>,
    /// Create the default container at install time.
    pub create_containers: bool,
    /// Let a container extracted from the deserialized message replace one
    /// already resolved at the header stage.
    pub container_override_from_message: bool,
    /// Outbox configuration.
    pub outbox: OutboxConfig,
    /// Saga configuration.
    pub saga: SagaConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_name: "batchstore".to_string(),
            default_container: None,
            create_containers: false,
            container_override_from_message: false,
            outbox: OutboxConfig::default(),
            saga: SagaConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `batchstore.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Default container as `ContainerInformation`, if configured.
    pub fn default_container_information(&self) -> Option<ContainerInformation> {
        self.default_container.clone().map(Into::into)
    }

    /// Convenience for tests and embedded use.
    pub fn with_default_container(mut self, name: &str, partition_key_path: &str) -> Result<Self> {
        self.default_container = Some(ContainerConfig {
            name: name.to_string(),
            partition_key_path: PartitionKeyPath::parse(partition_key_path)?,
        });
        Ok(self)
    }
}
