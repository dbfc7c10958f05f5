//! Retry utilities: backoff builders for the emitter and the author-sync
//! consumer.
//!
//! Uses `backon`. Attempt counts in configuration include the first call,
//! while `with_max_times` counts retries only.

use backon::{ConstantBuilder, FibonacciBuilder};

use crate::config::{ConsumerConfig, EmitRetryConfig};

/// Fibonacci backoff for change-event emission.
///
/// - Min delay: `base_delay_ms` (200ms by default)
/// - Max delay: `max_delay_ms`
/// - Retries: `max_attempts - 1`
pub fn emit_backoff(config: &EmitRetryConfig) -> FibonacciBuilder {
    FibonacciBuilder::default()
        .with_min_delay(config.base_delay())
        .with_max_delay(config.max_delay())
        .with_max_times(config.max_attempts.saturating_sub(1))
}

/// Fixed-delay redelivery for inbound author records.
///
/// - Delay: `delay_ms` (10ms by default)
/// - Retries: `max_retries`
pub fn redelivery_backoff(config: &ConsumerConfig) -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(config.delay())
        .with_max_times(config.max_retries)
}
