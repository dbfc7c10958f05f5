//! Shared utilities for integration tests.
//!
//! Wires the standalone stack (in-memory store, channel broker) the same way
//! the binaries do, so tests drive it only through public APIs.

use std::sync::Arc;
use std::time::Duration;

use quill::bus::ChannelBroker;
use quill::config::Config;
use quill::consumer::AuthorSyncConsumer;
use quill::interfaces::{MessageBroker, OutboundRecord};
use quill::services::PostService;
use quill::storage::InMemoryDocumentStore;

/// Upper bound for anything the tests wait on.
pub const WAIT: Duration = Duration::from_secs(2);

/// A complete standalone deployment.
pub struct Harness {
    pub config: Config,
    pub store: Arc<InMemoryDocumentStore>,
    pub broker: Arc<ChannelBroker>,
    pub service: PostService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::for_test())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryDocumentStore::new());
        let broker = Arc::new(ChannelBroker::new());
        let service = PostService::from_config(&config, store.clone(), store.clone(), broker.clone());
        Self {
            config,
            store,
            broker,
            service,
        }
    }

    /// An author-sync consumer sharing this deployment's store.
    pub fn consumer(&self) -> AuthorSyncConsumer {
        AuthorSyncConsumer::from_config(
            self.service.reconciler().clone(),
            &self.config.messaging,
            self.config.consumer.clone(),
        )
    }

    /// Start the author-sync consumer on the configured topic and wait until
    /// it is subscribed.
    pub async fn spawn_consumer(&self) -> tokio::task::JoinHandle<()> {
        let consumer = self.consumer();
        let broker = self.broker.clone();
        let topic = self.config.messaging.authors_topic.clone();
        let handle = tokio::spawn(async move {
            let _ = consumer.run(broker.as_ref(), &topic).await;
        });

        let topic = self.config.messaging.authors_topic.as_str();
        let subscribed =
            wait_for(|| async move { self.broker.subscriber_count(topic).await > 0 }).await;
        assert!(subscribed, "consumer did not subscribe");
        handle
    }

    /// Publish an upstream author record on the author topic.
    pub async fn publish_author(&self, username: &str, active: bool) {
        let body = serde_json::json!({
            "username": username,
            "firstName": "First",
            "lastName": "Last",
            "active": active,
        });
        let record = OutboundRecord::new(
            self.config.messaging.authors_topic.as_str(),
            body.to_string().into_bytes(),
        )
        .with_key(username)
        .with_header(
            self.config.messaging.correlation_header.as_str(),
            uuid::Uuid::new_v4().to_string(),
        );
        self.broker.publish(record).await.unwrap();
    }

    /// Wait until the store reports `username` with the given active state.
    pub async fn wait_for_author(&self, username: &str, active: bool) -> bool {
        wait_for(|| async move {
            self.service
                .find_author_by_username(username)
                .await
                .ok()
                .flatten()
                .is_some_and(|author| author.active == active)
        })
        .await
    }

    /// Wait until the broker saw `count` acknowledgements.
    pub async fn wait_for_acked(&self, count: usize) -> bool {
        wait_for(|| async move { self.broker.acked_count() >= count }).await
    }

    /// Wait until the broker holds `count` dead letters.
    pub async fn wait_for_dead_letters(&self, count: usize) -> bool {
        wait_for(|| async move { self.broker.dead_letters().len() >= count }).await
    }
}

/// Poll `condition` until it holds or [`WAIT`] elapses.
pub async fn wait_for<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let poll = async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(WAIT, poll).await.is_ok()
}
