//! Fault-tolerance settings for the change-event emitter and the author-sync
//! consumer.

use std::time::Duration;

use serde::Deserialize;

/// Change-event emitter settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    pub bulkhead: BulkheadConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: EmitRetryConfig,
    pub buffer: BufferConfig,
}

/// Concurrency cap on in-flight emits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BulkheadConfig {
    /// Maximum emits in flight; extra calls fail fast.
    pub max_concurrent: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self { max_concurrent: 10 }
    }
}

/// Rolling-window circuit breaker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Size of the rolling window of attempt outcomes.
    pub request_volume_threshold: usize,
    /// Failure share of a full window that opens the breaker.
    pub failure_ratio: f64,
    /// How long the breaker stays open before a half-open probe, in ms.
    pub delay_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            request_volume_threshold: 10,
            failure_ratio: 0.5,
            delay_ms: 500,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Fibonacci retry for emit attempts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmitRetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    /// First backoff delay, in ms.
    pub base_delay_ms: u64,
    /// Cap for a single backoff delay, in ms.
    pub max_delay_ms: u64,
}

impl Default for EmitRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 10_000,
        }
    }
}

impl EmitRetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// What to do when the outbound buffer is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Fail the attempt with `BufferFull`; the retry policy may try again.
    #[default]
    Fail,
    /// Wait for space, bounded by the ack timeout.
    Block,
}

/// Outbound buffer between emit calls and the broker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Messages awaiting broker acceptance.
    pub capacity: usize,
    pub overflow: OverflowPolicy,
    /// Upper bound on one publish, from its start to the broker ack, in ms.
    /// Also bounds the wait for space under `Block`.
    pub ack_timeout_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            overflow: OverflowPolicy::Fail,
            ack_timeout_ms: 1_000,
        }
    }
}

impl BufferConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Redelivery policy for inbound author records.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Redeliveries after the first attempt.
    pub max_retries: usize,
    /// Fixed delay between attempts, in ms.
    pub delay_ms: u64,
    /// Upper bound on one attempt, in ms.
    pub attempt_timeout_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay_ms: 10,
            attempt_timeout_ms: 1_000,
        }
    }
}

impl ConsumerConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}
