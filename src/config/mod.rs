//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod messaging;
mod resilience;
mod search;
mod storage;

pub use messaging::{
    KafkaConfig, MessagingConfig, MessagingType, DEFAULT_AUTHORS_TOPIC,
    DEFAULT_CORRELATION_HEADER, DEFAULT_POSTS_TOPIC,
};
pub use resilience::{
    BufferConfig, BulkheadConfig, CircuitBreakerConfig, ConsumerConfig, EmitRetryConfig,
    EmitterConfig, OverflowPolicy,
};
pub use search::SearchConfig;
pub use storage::{MongodbConfig, StorageConfig, StorageType, DEFAULT_STORE_TIMEOUT_MS};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "QUILL_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "QUILL";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "QUILL_LOG";

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Document store configuration.
    pub storage: StorageConfig,
    /// Broker configuration.
    pub messaging: MessagingConfig,
    /// Search defaults.
    pub search: SearchConfig,
    /// Change-event emitter fault tolerance.
    pub emitter: EmitterConfig,
    /// Author-sync consumer redelivery policy.
    pub consumer: ConsumerConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
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

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}
