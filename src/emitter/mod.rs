//! Change-event emitter.
//!
//! Publishes post mutations to the broker behind four layers, outermost
//! first: a bulkhead capping concurrent emits, Fibonacci retry, a circuit
//! breaker guarding each attempt, and a bounded buffer whose dispatcher runs
//! as many publishes at once as the bulkhead admits emits. Delivery is
//! at-least-once: a broker that accepted a record but timed out before
//! acknowledging it may see the retried record again.

mod buffer;
mod bulkhead;
mod circuit_breaker;

pub use buffer::{OutboundBuffer, PublishAck};
pub use bulkhead::Bulkhead;
pub use circuit_breaker::{Admission, BreakerState, CallOutcome, CircuitBreaker};

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::{EmitterConfig, MessagingConfig};
use crate::error::ValidationError;
use crate::interfaces::{BusError, MessageBroker, OutboundRecord};
use crate::model::{non_blank, ChangeEvent};
use crate::utils::retry::emit_backoff;

/// Why an emit did not complete.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Too many emits in flight")]
    BulkheadFull,

    #[error("Circuit breaker open")]
    CircuitOpen,

    #[error("Outbound buffer full")]
    BufferFull,

    #[error("Broker rejected record: {0}")]
    Nack(BusError),

    #[error("No broker ack within {0:?}")]
    Timeout(Duration),

    #[error("Emitter closed")]
    Closed,

    #[error("Failed to encode change event: {0}")]
    Encode(String),
}

impl EmitError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmitError::BufferFull | EmitError::Nack(_) | EmitError::Timeout(_)
        )
    }

    /// How the breaker should count an attempt that ended this way.
    fn call_outcome(&self) -> CallOutcome {
        match self {
            EmitError::Nack(_) | EmitError::Timeout(_) => CallOutcome::Failure,
            _ => CallOutcome::Neutral,
        }
    }

    #[cfg(feature = "otel")]
    fn label(&self) -> &'static str {
        match self {
            EmitError::Validation(_) => "validation",
            EmitError::BulkheadFull => "bulkhead_full",
            EmitError::CircuitOpen => "circuit_open",
            EmitError::BufferFull => "buffer_full",
            EmitError::Nack(_) => "nack",
            EmitError::Timeout(_) => "timeout",
            EmitError::Closed => "closed",
            EmitError::Encode(_) => "encode",
        }
    }
}

/// Resilient publisher of [`ChangeEvent`]s.
pub struct ChangeEventEmitter {
    topic: String,
    correlation_header: String,
    config: EmitterConfig,
    bulkhead: Bulkhead,
    breaker: CircuitBreaker,
    buffer: OutboundBuffer,
}

impl ChangeEventEmitter {
    /// Create an emitter publishing to `topic`. Spawns the buffer dispatcher,
    /// so it must be called from within a tokio runtime.
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        topic: impl Into<String>,
        correlation_header: impl Into<String>,
        config: EmitterConfig,
    ) -> Self {
        Self {
            topic: topic.into(),
            correlation_header: correlation_header.into(),
            bulkhead: Bulkhead::new(config.bulkhead.max_concurrent),
            breaker: CircuitBreaker::new(&config.circuit_breaker),
            buffer: OutboundBuffer::spawn(
                broker,
                &config.buffer,
                config.bulkhead.max_concurrent,
            ),
            config,
        }
    }

    /// Create an emitter using the topic and header from messaging config.
    pub fn from_config(
        broker: Arc<dyn MessageBroker>,
        messaging: &MessagingConfig,
        config: EmitterConfig,
    ) -> Self {
        Self::new(
            broker,
            messaging.posts_topic.clone(),
            messaging.correlation_header.clone(),
            config,
        )
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    pub fn in_flight(&self) -> usize {
        self.bulkhead.in_flight()
    }

    /// Publish `event` and wait until the broker accepted it or the policy
    /// gave up.
    #[tracing::instrument(name = "emit", skip_all, fields(correlation_id = %correlation_id.trim(), post_id = %event.id, action = ?event.action))]
    pub async fn emit(&self, correlation_id: &str, event: &ChangeEvent) -> Result<(), EmitError> {
        #[cfg(feature = "otel")]
        let start = std::time::Instant::now();

        let result = self.emit_inner(correlation_id, event).await;

        #[cfg(feature = "otel")]
        {
            use crate::utils::metrics::{self, EMIT_DURATION, EMIT_TOTAL};
            let outcome = match &result {
                Ok(()) => "success",
                Err(e) => e.label(),
            };
            let attrs = [metrics::outcome_attr(outcome), metrics::topic_attr(&self.topic)];
            EMIT_DURATION.record(start.elapsed().as_secs_f64(), &attrs);
            EMIT_TOTAL.add(1, &attrs);
        }

        if let Err(e) = &result {
            error!(error = %e, "Change event not delivered");
        }
        result
    }

    /// Validate now, deliver in the background.
    ///
    /// Returns the delivery task so callers may await it; dropping the handle
    /// does not cancel delivery.
    pub fn emit_detached(
        self: &Arc<Self>,
        correlation_id: &str,
        event: ChangeEvent,
    ) -> Result<JoinHandle<Result<(), EmitError>>, EmitError> {
        let correlation_id = validated_correlation_id(correlation_id)?.to_string();
        let emitter = Arc::clone(self);
        Ok(tokio::spawn(async move {
            emitter.emit(&correlation_id, &event).await
        }))
    }

    async fn emit_inner(&self, correlation_id: &str, event: &ChangeEvent) -> Result<(), EmitError> {
        let correlation_id = validated_correlation_id(correlation_id)?;
        let _permit = self.bulkhead.try_enter().ok_or(EmitError::BulkheadFull)?;
        let record = self.record_for(correlation_id, event)?;

        (|| async { self.attempt(record.clone(), correlation_id).await })
            .retry(emit_backoff(&self.config.retry))
            .when(EmitError::is_retryable)
            .notify(|err: &EmitError, delay: Duration| {
                warn!(error = %err, delay = ?delay, "Emit attempt failed, retrying");
            })
            .await
    }

    /// One pass through breaker and buffer.
    async fn attempt(&self, record: OutboundRecord, correlation_id: &str) -> Result<(), EmitError> {
        let admission = self.breaker.try_acquire().ok_or(EmitError::CircuitOpen)?;
        let result = self.buffer.submit(record, correlation_id).await;

        let outcome = match &result {
            Ok(()) => CallOutcome::Success,
            Err(e) => e.call_outcome(),
        };
        self.breaker.record(admission, outcome);
        debug!(outcome = ?outcome, pending = self.buffer.pending(), "Emit attempt settled");
        result
    }

    fn record_for(&self, correlation_id: &str, event: &ChangeEvent) -> Result<OutboundRecord, EmitError> {
        let payload = serde_json::to_vec(event).map_err(|e| EmitError::Encode(e.to_string()))?;
        Ok(OutboundRecord::new(self.topic.as_str(), payload)
            .with_key(event.id.as_str())
            .with_header(self.correlation_header.as_str(), correlation_id))
    }
}

fn validated_correlation_id(correlation_id: &str) -> Result<&str, ValidationError> {
    non_blank(correlation_id).ok_or(ValidationError::BlankCorrelationId)
}

#[cfg(test)]
mod tests;
