//! Message broker interface for publication and at-least-once subscription.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Subscribe not supported for this bus type")]
    SubscribeNotSupported,

    #[error("Broker closed")]
    Closed,
}

/// Ordered record headers. Names may repeat; lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, Vec<u8>)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.insert(name, value);
        self
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_slice())
    }

    /// First value under `name`, if it is valid UTF-8.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A record to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: Option<String>,
    pub value: Vec<u8>,
    pub headers: Headers,
}

impl OutboundRecord {
    pub fn new(topic: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            value: value.into(),
            headers: Headers::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A record received from a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
    pub topic: String,
    pub key: Option<String>,
    pub value: Vec<u8>,
    pub headers: Headers,
    /// Broker-assigned timestamp, when the broker provides one.
    pub timestamp: Option<DateTime<Utc>>,
}

impl InboundRecord {
    pub fn new(topic: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            value: value.into(),
            headers: Headers::new(),
            timestamp: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Convert a published record into what a subscriber would see.
    pub fn from_outbound(record: OutboundRecord, timestamp: DateTime<Utc>) -> Self {
        Self {
            topic: record.topic,
            key: record.key,
            value: record.value,
            headers: record.headers,
            timestamp: Some(timestamp),
        }
    }
}

/// Settles one delivery with the broker.
pub trait Acknowledger: Send {
    /// Processing finished; the broker may forget the record.
    fn ack(self: Box<Self>);

    /// Processing failed permanently; the broker decides what happens next.
    fn nack(self: Box<Self>, reason: &str);
}

/// Acknowledger for brokers without per-record settlement.
pub struct NoopAcknowledger;

impl Acknowledger for NoopAcknowledger {
    fn ack(self: Box<Self>) {}

    fn nack(self: Box<Self>, _reason: &str) {}
}

/// One at-least-once delivery.
pub struct Delivery {
    pub record: InboundRecord,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(record: InboundRecord, acker: Box<dyn Acknowledger>) -> Self {
        Self { record, acker }
    }

    /// A delivery whose settlement is ignored.
    pub fn unacknowledged(record: InboundRecord) -> Self {
        Self::new(record, Box::new(NoopAcknowledger))
    }

    pub fn ack(self) {
        self.acker.ack();
    }

    pub fn nack(self, reason: &str) {
        self.acker.nack(reason);
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

/// Stream of deliveries for one topic.
pub struct Subscription {
    receiver: mpsc::Receiver<Delivery>,
}

impl Subscription {
    pub fn new(receiver: mpsc::Receiver<Delivery>) -> Self {
        Self { receiver }
    }

    /// Next delivery, or `None` once the broker side is gone.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}

/// Interface to the message broker.
///
/// Implementations:
/// - `ChannelBroker`: in-process channels
/// - `MockBroker`: recording mock for tests
/// - `KafkaBroker`: Kafka via rdkafka
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publish a record. Resolves `Ok` on broker ack and `Err` on nack.
    async fn publish(&self, record: OutboundRecord) -> Result<()>;

    /// Subscribe to a topic with at-least-once delivery.
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;
}
