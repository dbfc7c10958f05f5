//! Storage configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Default per-call store timeout.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// In-memory document store (no external deps).
    #[default]
    Memory,
    /// MongoDB document store.
    Mongodb,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageType::Memory => f.write_str("memory"),
            StorageType::Mongodb => f.write_str("mongodb"),
        }
    }
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// Upper bound for every store call, in milliseconds.
    pub timeout_ms: u64,
    /// MongoDB-specific configuration.
    pub mongodb: MongodbConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            mongodb: MongodbConfig::default(),
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// MongoDB-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MongodbConfig {
    /// MongoDB connection URI.
    pub uri: String,
    /// Database name.
    pub database: String,
}

impl Default for MongodbConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "quill".to_string(),
        }
    }
}
