//! Mock broker implementation for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::interfaces::broker::{BusError, MessageBroker, OutboundRecord, Result, Subscription};

/// Mock broker for testing.
///
/// Records every accepted publish. Failures can be forced permanently with
/// [`set_fail_on_publish`](Self::set_fail_on_publish) or for the next few
/// calls with [`fail_next`](Self::fail_next); a failed publish is the
/// broker's nack.
#[derive(Default)]
pub struct MockBroker {
    published: RwLock<Vec<OutboundRecord>>,
    fail_on_publish: RwLock<bool>,
    fail_remaining: RwLock<usize>,
    latency: RwLock<Option<Duration>>,
    attempts: AtomicUsize,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    /// Nack the next `count` publishes, then accept again.
    pub async fn fail_next(&self, count: usize) {
        *self.fail_remaining.write().await = count;
    }

    /// Delay every publish by `latency` before settling it.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().await = latency;
    }

    /// Publish calls received, accepted or not.
    pub fn publish_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn published(&self) -> Vec<OutboundRecord> {
        self.published.read().await.clone()
    }

    pub async fn take_published(&self) -> Vec<OutboundRecord> {
        std::mem::take(&mut *self.published.write().await)
    }

    /// Wait until at least `count` records were accepted, polling until
    /// `timeout` elapses. Returns whether the count was reached.
    pub async fn wait_for_published(&self, count: usize, timeout: Duration) -> bool {
        let poll = async {
            while self.published_count().await < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }

    async fn should_fail(&self) -> bool {
        if *self.fail_on_publish.read().await {
            return true;
        }
        let mut remaining = self.fail_remaining.write().await;
        if *remaining > 0 {
            *remaining -= 1;
            return true;
        }
        false
    }
}

#[async_trait]
impl MessageBroker for MockBroker {
    async fn publish(&self, record: OutboundRecord) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.should_fail().await {
            return Err(BusError::Publish("Mock publish failure".to_string()));
        }
        self.published.write().await.push(record);
        Ok(())
    }

    async fn subscribe(&self, _topic: &str) -> Result<Subscription> {
        Err(BusError::SubscribeNotSupported)
    }
}
