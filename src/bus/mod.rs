//! Message brokers for change-event publication and author sync.
//!
//! This module contains:
//! - Implementations of the `MessageBroker` trait: in-process channels, a
//!   recording mock, and Kafka
//! - `init_broker`: factory selecting the implementation from configuration

use std::sync::Arc;

use tracing::info;

use crate::config::{MessagingConfig, MessagingType};
use crate::interfaces::MessageBroker;

// Implementation modules
#[cfg(feature = "channel")]
pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod mock;

// Re-exports
#[cfg(feature = "channel")]
pub use channel::{ChannelBroker, DeadLetter};
#[cfg(feature = "kafka")]
pub use kafka::KafkaBroker;
pub use mock::MockBroker;

/// Initialize the message broker based on configuration.
///
/// Requires the corresponding feature to be enabled:
/// - Channel: `--features channel` (included in default)
/// - Kafka: `--features kafka`
pub async fn init_broker(
    config: &MessagingConfig,
) -> std::result::Result<Arc<dyn MessageBroker>, Box<dyn std::error::Error>> {
    match config.messaging_type {
        MessagingType::Channel => {
            #[cfg(feature = "channel")]
            {
                info!(messaging_type = "channel", "Message broker initialized");
                Ok(Arc::new(ChannelBroker::new()))
            }

            #[cfg(not(feature = "channel"))]
            {
                Err("Channel support requires the 'channel' feature. Rebuild with --features channel".into())
            }
        }
        MessagingType::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let broker = KafkaBroker::new(config.kafka.clone())?;
                info!(messaging_type = "kafka", "Message broker initialized");
                Ok(Arc::new(broker))
            }

            #[cfg(not(feature = "kafka"))]
            {
                Err("Kafka support requires the 'kafka' feature. Rebuild with --features kafka".into())
            }
        }
    }
}
