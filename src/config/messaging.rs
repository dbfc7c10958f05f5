//! Messaging and broker configuration types.

use serde::Deserialize;

/// Default topic for outbound post change events.
pub const DEFAULT_POSTS_TOPIC: &str = "posts";
/// Default topic for inbound author records.
pub const DEFAULT_AUTHORS_TOPIC: &str = "appusers";
/// Default header carrying the correlation id.
pub const DEFAULT_CORRELATION_HEADER: &str = "correlationId";

/// Messaging type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// In-process channels (no external broker).
    #[default]
    Channel,
    /// Kafka messaging.
    Kafka,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// Topic that receives post change events.
    pub posts_topic: String,
    /// Topic carrying author records from the identity feed.
    pub authors_topic: String,
    /// Header name used for correlation ids, both directions.
    pub correlation_header: String,
    /// Kafka-specific configuration.
    pub kafka: KafkaConfig,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            messaging_type: MessagingType::Channel,
            posts_topic: DEFAULT_POSTS_TOPIC.to_string(),
            authors_topic: DEFAULT_AUTHORS_TOPIC.to_string(),
            correlation_header: DEFAULT_CORRELATION_HEADER.to_string(),
            kafka: KafkaConfig::default(),
        }
    }
}

/// Kafka-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Consumer group ID.
    pub group_id: String,
    /// Producer delivery timeout in milliseconds.
    pub message_timeout_ms: u64,
    /// SASL username (optional, for authenticated clusters).
    pub sasl_username: Option<String>,
    /// SASL password (optional, for authenticated clusters).
    pub sasl_password: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            group_id: "quill".to_string(),
            message_timeout_ms: 5_000,
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
        }
    }
}
