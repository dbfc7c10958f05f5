//! In-memory channel-based broker for standalone mode.
//!
//! Each subscription owns a bounded mpsc channel; publishing fans a record out
//! to every live subscription of its topic. Ideal for local development and
//! testing without external dependencies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};

use crate::interfaces::broker::{
    Acknowledger, BusError, Delivery, InboundRecord, MessageBroker, OutboundRecord, Result,
    Subscription,
};

/// Per-subscription channel capacity.
const CHANNEL_CAPACITY: usize = 1024;

/// A record a subscriber rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub record: InboundRecord,
    pub reason: String,
}

#[derive(Default)]
struct Settlements {
    acked: AtomicUsize,
    dead_letters: Mutex<Vec<DeadLetter>>,
}

struct ChannelAcker {
    record: InboundRecord,
    settlements: Arc<Settlements>,
}

impl Acknowledger for ChannelAcker {
    fn ack(self: Box<Self>) {
        self.settlements.acked.fetch_add(1, Ordering::SeqCst);
    }

    fn nack(self: Box<Self>, reason: &str) {
        error!(topic = %self.record.topic, reason, "Record rejected by subscriber");
        let letter = DeadLetter {
            record: self.record,
            reason: reason.to_string(),
        };
        self.settlements
            .dead_letters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(letter);
    }
}

/// In-process broker using tokio mpsc channels.
///
/// Publishing resolves once the record is queued for every subscriber, which
/// is the closest analogue of a broker ack. A topic without subscribers
/// accepts and discards.
#[derive(Default)]
pub struct ChannelBroker {
    topics: RwLock<HashMap<String, Vec<mpsc::Sender<Delivery>>>>,
    settlements: Arc<Settlements>,
}

impl ChannelBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries acknowledged by subscribers so far.
    pub fn acked_count(&self) -> usize {
        self.settlements.acked.load(Ordering::SeqCst)
    }

    /// Records negatively acknowledged by subscribers, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.settlements
            .dead_letters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of live subscriptions on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map_or(0, |senders| senders.iter().filter(|s| !s.is_closed()).count())
    }

    fn delivery(&self, record: InboundRecord) -> Delivery {
        let acker = ChannelAcker {
            record: record.clone(),
            settlements: self.settlements.clone(),
        };
        Delivery::new(record, Box::new(acker))
    }

    /// Queue `record` to every subscriber of `topic`.
    async fn fan_out(&self, record: OutboundRecord, timestamp: DateTime<Utc>) -> Result<usize> {
        let senders = match self.topics.read().await.get(&record.topic) {
            Some(senders) => senders.clone(),
            None => return Ok(0),
        };

        let inbound = InboundRecord::from_outbound(record, timestamp);
        let mut delivered = 0;
        for sender in senders {
            if sender.send(self.delivery(inbound.clone())).await.is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 {
            // Every subscriber dropped its receiver.
            self.topics
                .write()
                .await
                .entry(inbound.topic.clone())
                .or_default()
                .retain(|s| !s.is_closed());
        }
        Ok(delivered)
    }
}

#[async_trait]
impl MessageBroker for ChannelBroker {
    #[tracing::instrument(name = "broker.publish", skip_all, fields(topic = %record.topic))]
    async fn publish(&self, record: OutboundRecord) -> Result<()> {
        let receivers = self.fan_out(record, Utc::now()).await?;
        debug!(receivers, "Published record to channel");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        if topic.trim().is_empty() {
            return Err(BusError::Subscribe("topic must not be blank".to_string()));
        }

        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let count = {
            let mut topics = self.topics.write().await;
            let senders = topics.entry(topic.to_string()).or_default();
            senders.retain(|s| !s.is_closed());
            senders.push(sender);
            senders.len()
        };

        info!(topic, subscriber_count = count, "Subscribed to channel topic");
        Ok(Subscription::new(receiver))
    }
}
