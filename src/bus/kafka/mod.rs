//! Kafka broker implementation.
//!
//! Records are published with the post id as key, so events for one post stay
//! ordered within a partition. Subscriptions use the configured consumer group
//! and commit an offset only when its delivery is acknowledged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers as _, Message as _, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::interfaces::broker::{
    Acknowledger, BusError, Delivery, Headers, InboundRecord, MessageBroker, OutboundRecord,
    Result, Subscription,
};

/// Deliveries buffered between the consumer stream and the subscriber.
const SUBSCRIPTION_BUFFER: usize = 256;

fn build_producer_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", &config.bootstrap_servers);
    client.set("message.timeout.ms", config.message_timeout_ms.to_string());
    client.set("acks", "all");
    client.set("enable.idempotence", "true");

    apply_security_config(&mut client, config);
    client
}

fn build_consumer_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", &config.bootstrap_servers);
    client.set("group.id", &config.group_id);
    client.set("enable.auto.commit", "false");
    client.set("auto.offset.reset", "earliest");

    apply_security_config(&mut client, config);
    client
}

fn apply_security_config(client: &mut ClientConfig, config: &KafkaConfig) {
    if let Some(ref protocol) = config.security_protocol {
        client.set("security.protocol", protocol);
    }

    if let Some(ref mechanism) = config.sasl_mechanism {
        client.set("sasl.mechanism", mechanism);
    }

    if let Some(ref username) = config.sasl_username {
        client.set("sasl.username", username);
    }

    if let Some(ref password) = config.sasl_password {
        client.set("sasl.password", password);
    }
}

fn owned_headers(headers: &Headers) -> OwnedHeaders {
    headers.iter().fold(OwnedHeaders::new(), |acc, (key, value)| {
        acc.insert(Header {
            key,
            value: Some(value),
        })
    })
}

fn inbound_record(message: &BorrowedMessage<'_>) -> InboundRecord {
    let mut record = InboundRecord::new(message.topic(), message.payload().unwrap_or_default());
    record.key = message
        .key()
        .and_then(|key| std::str::from_utf8(key).ok())
        .map(str::to_string);

    if let Some(headers) = message.headers() {
        for header in headers.iter() {
            record
                .headers
                .insert(header.key, header.value.unwrap_or_default());
        }
    }

    record.timestamp = message
        .timestamp()
        .to_millis()
        .and_then(DateTime::<Utc>::from_timestamp_millis);
    record
}

/// Commits the delivery's offset on ack and commits nothing on nack.
///
/// Kafka offsets are per partition, so the next acked record on the same
/// partition commits past a nacked one and it is not redelivered. Parking
/// poison records is left to the broker's operator.
struct KafkaAcker {
    consumer: Arc<StreamConsumer>,
    topic: String,
    partition: i32,
    offset: i64,
}

impl Acknowledger for KafkaAcker {
    fn ack(self: Box<Self>) {
        let mut offsets = TopicPartitionList::new();
        if let Err(e) =
            offsets.add_partition_offset(&self.topic, self.partition, Offset::Offset(self.offset + 1))
        {
            error!(error = %e, "Failed to build offset list");
            return;
        }
        if let Err(e) = self.consumer.commit(&offsets, CommitMode::Async) {
            error!(error = %e, topic = %self.topic, offset = self.offset, "Failed to commit offset");
        }
    }

    fn nack(self: Box<Self>, reason: &str) {
        warn!(
            topic = %self.topic,
            partition = self.partition,
            offset = self.offset,
            reason,
            "Delivery nacked, a later ack on this partition commits past it"
        );
    }
}

/// Kafka broker implementation.
pub struct KafkaBroker {
    producer: FutureProducer,
    config: KafkaConfig,
}

impl KafkaBroker {
    /// Create a new Kafka broker client.
    pub fn new(config: KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = build_producer_config(&config)
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka producer: {}", e)))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            group_id = %config.group_id,
            "Connected to Kafka"
        );

        Ok(Self { producer, config })
    }

    fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.config.message_timeout_ms)
    }
}

#[async_trait]
impl MessageBroker for KafkaBroker {
    async fn publish(&self, record: OutboundRecord) -> Result<()> {
        let mut future_record = FutureRecord::to(&record.topic)
            .payload(&record.value)
            .headers(owned_headers(&record.headers));

        if let Some(ref key) = record.key {
            future_record = future_record.key(key);
        }

        let (partition, offset) = self
            .producer
            .send(future_record, self.delivery_timeout())
            .await
            .map_err(|(e, _)| BusError::Publish(format!("Failed to publish: {}", e)))?;

        debug!(
            topic = %record.topic,
            key = ?record.key,
            partition,
            offset,
            "Published record to Kafka"
        );
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let consumer: StreamConsumer = build_consumer_config(&self.config)
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka consumer: {}", e)))?;
        consumer
            .subscribe(&[topic])
            .map_err(|e| BusError::Subscribe(format!("Failed to subscribe to {}: {}", topic, e)))?;

        info!(topic, group_id = %self.config.group_id, "Subscribed to Kafka topic");

        let consumer = Arc::new(consumer);
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);

        tokio::spawn(async move {
            use futures::StreamExt;

            let mut stream = consumer.stream();
            while let Some(result) = stream.next().await {
                let message = match result {
                    Ok(message) => message,
                    Err(e) => {
                        error!(error = %e, "Kafka consumer error");
                        continue;
                    }
                };

                let acker = KafkaAcker {
                    consumer: consumer.clone(),
                    topic: message.topic().to_string(),
                    partition: message.partition(),
                    offset: message.offset(),
                };
                let delivery = Delivery::new(inbound_record(&message), Box::new(acker));

                if sender.send(delivery).await.is_err() {
                    info!("Subscription dropped, stopping Kafka consumer");
                    break;
                }
            }
        });

        Ok(Subscription::new(receiver))
    }
}
