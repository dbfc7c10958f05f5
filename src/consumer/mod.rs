//! Author-sync consumer.
//!
//! Turns identity-feed records into author reconciliations. Records without a
//! correlation id or with an unusable payload are acknowledged and dropped;
//! only store trouble leads to redelivery.

mod payload;

pub use payload::AuthorSyncPayload;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::{ConsumerConfig, MessagingConfig};
use crate::error::{InfraError, ServiceError, ValidationError};
use crate::interfaces::{BusError, InboundRecord, MessageBroker};
use crate::model::{non_blank, Author, AuthorInput};
use crate::services::AuthorReconciler;
use crate::utils::retry::redelivery_backoff;

/// Why a record was acknowledged without being applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    MissingCorrelationId,
    MalformedPayload(String),
    Rejected(ValidationError),
}

/// Result of handling one record that needs no redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Reconciled(Author),
    Dropped(DropReason),
}

/// Failure of one processing attempt, or of the whole redelivery policy.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Reconciliation of {username:?} returned no record")]
    EmptyReconciliation { username: String },

    #[error("Reconciliation failed: {0}")]
    Infra(#[from] InfraError),

    #[error("Processing attempt exceeded {0:?}")]
    Timeout(Duration),

    #[error("Rejected: {0}")]
    Rejected(ValidationError),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<ProcessingError>,
    },
}

impl ProcessingError {
    /// Whether redelivering the record could succeed.
    pub fn is_redeliverable(&self) -> bool {
        matches!(
            self,
            ProcessingError::EmptyReconciliation { .. }
                | ProcessingError::Infra(_)
                | ProcessingError::Timeout(_)
        )
    }
}

impl From<ServiceError> for ProcessingError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(v) => ProcessingError::Rejected(v),
            ServiceError::Infra(i) => ProcessingError::Infra(i),
        }
    }
}

/// Consumes author records and reconciles them.
pub struct AuthorSyncConsumer {
    reconciler: Arc<AuthorReconciler>,
    correlation_header: String,
    config: ConsumerConfig,
}

impl AuthorSyncConsumer {
    pub fn new(
        reconciler: Arc<AuthorReconciler>,
        correlation_header: impl Into<String>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            reconciler,
            correlation_header: correlation_header.into(),
            config,
        }
    }

    pub fn from_config(
        reconciler: Arc<AuthorReconciler>,
        messaging: &MessagingConfig,
        config: ConsumerConfig,
    ) -> Self {
        Self::new(reconciler, messaging.correlation_header.clone(), config)
    }

    /// Handle one record.
    ///
    /// `Ok` means the record is settled and may be acknowledged. `Err` is
    /// always [`ProcessingError::Exhausted`]: redelivery did not help.
    pub async fn consume(&self, record: &InboundRecord) -> Result<ConsumeOutcome, ProcessingError> {
        let Some(correlation_id) = record
            .headers
            .get_str(&self.correlation_header)
            .and_then(non_blank)
        else {
            error!(
                topic = %record.topic,
                header = %self.correlation_header,
                "Correlation id header missing or blank, ignoring record"
            );
            return Ok(ConsumeOutcome::Dropped(DropReason::MissingCorrelationId));
        };

        let payload = match AuthorSyncPayload::decode(&record.value) {
            Ok(payload) => payload,
            Err(e) => {
                error!(correlation_id, error = %e, "Invalid author payload, ignoring record");
                return Ok(ConsumeOutcome::Dropped(DropReason::MalformedPayload(
                    e.to_string(),
                )));
            }
        };
        debug!(correlation_id, username = %payload.username, "Processing author record");

        let result = self
            .process_with_redelivery(correlation_id, &payload.to_author_input())
            .await;
        self.record_latency(record, correlation_id, &result);

        match result {
            Ok(author) => {
                info!(
                    correlation_id,
                    username = %author.username,
                    author_id = %author.id,
                    "Author record processed"
                );
                Ok(ConsumeOutcome::Reconciled(author))
            }
            Err(ProcessingError::Rejected(v)) => {
                error!(correlation_id, error = %v, "Author record rejected, ignoring record");
                Ok(ConsumeOutcome::Dropped(DropReason::Rejected(v)))
            }
            Err(e) => Err(e),
        }
    }

    /// Reconcile with fixed-delay redelivery and a per-attempt timeout.
    pub async fn process_with_redelivery(
        &self,
        correlation_id: &str,
        input: &AuthorInput,
    ) -> Result<Author, ProcessingError> {
        let attempts = AtomicUsize::new(0);

        let result = (|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            self.attempt(input).await
        })
        .retry(redelivery_backoff(&self.config))
        .when(ProcessingError::is_redeliverable)
        .notify(|err: &ProcessingError, delay: Duration| {
            warn!(correlation_id, error = %err, delay = ?delay, "Author record failed, redelivering");
        })
        .await;

        match result {
            Err(e) if e.is_redeliverable() => Err(ProcessingError::Exhausted {
                attempts: attempts.load(Ordering::SeqCst),
                last: Box::new(e),
            }),
            other => other,
        }
    }

    async fn attempt(&self, input: &AuthorInput) -> Result<Author, ProcessingError> {
        let timeout = self.config.attempt_timeout();
        match tokio::time::timeout(timeout, self.reconciler.reconcile(input)).await {
            Ok(Ok(Some(author))) => Ok(author),
            Ok(Ok(None)) => Err(ProcessingError::EmptyReconciliation {
                username: input.username.clone(),
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ProcessingError::Timeout(timeout)),
        }
    }

    fn record_latency(
        &self,
        record: &InboundRecord,
        correlation_id: &str,
        result: &Result<Author, ProcessingError>,
    ) {
        let Some(timestamp) = record.timestamp else {
            return;
        };
        let latency = (Utc::now() - timestamp).to_std().unwrap_or_default();
        debug!(correlation_id, latency_ms = latency.as_millis() as u64, "Author record latency");

        #[cfg(feature = "otel")]
        {
            use crate::utils::metrics::{self, CONSUMER_LATENCY, CONSUMER_TOTAL};
            let outcome = match result {
                Ok(_) => "success",
                Err(ProcessingError::Rejected(_)) => "rejected",
                Err(_) => "failed",
            };
            let attrs = [metrics::outcome_attr(outcome), metrics::topic_attr(&record.topic)];
            CONSUMER_LATENCY.record(latency.as_secs_f64(), &attrs);
            CONSUMER_TOTAL.add(1, &attrs);
        }
        #[cfg(not(feature = "otel"))]
        let _ = result;
    }

    /// Subscribe to `topic` and process deliveries until the subscription
    /// ends. Settled records are acknowledged; exhausted ones are nacked.
    pub async fn run(&self, broker: &dyn MessageBroker, topic: &str) -> Result<(), BusError> {
        let mut subscription = broker.subscribe(topic).await?;
        info!(topic, "Author sync consumer started");

        while let Some(delivery) = subscription.next().await {
            match self.consume(&delivery.record).await {
                Ok(_) => delivery.ack(),
                Err(e) => {
                    error!(topic, error = %e, "Author record processing failed");
                    delivery.nack(&e.to_string());
                }
            }
        }

        info!(topic, "Subscription closed, author sync consumer stopping");
        Ok(())
    }
}
