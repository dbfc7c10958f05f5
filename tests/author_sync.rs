//! Author synchronisation over the channel broker.
//!
//! Run with: cargo test --test author_sync

#![cfg(all(feature = "memory", feature = "channel"))]

mod common;

use common::Harness;
use quill::config::Config;
use quill::interfaces::{MessageBroker, OutboundRecord};

#[tokio::test]
async fn test_author_records_are_reconciled_and_acked() {
    let harness = Harness::new();
    harness.spawn_consumer().await;

    harness.publish_author("John.Doe", true).await;
    harness.publish_author("jane", false).await;

    assert!(harness.wait_for_author("john.doe", true).await);
    assert!(harness.wait_for_author("jane", false).await);
    assert!(harness.wait_for_acked(2).await);
    assert!(harness.broker.dead_letters().is_empty());
}

#[tokio::test]
async fn test_repeated_records_converge_on_one_author() {
    let harness = Harness::new();
    harness.spawn_consumer().await;

    harness.publish_author("alice", true).await;
    harness.publish_author("ALICE", true).await;
    harness.publish_author("alice", false).await;

    assert!(harness.wait_for_acked(3).await);
    assert_eq!(harness.store.author_count().await, 1);
    assert!(!harness.service.is_author_active("alice").await.unwrap());
}

#[tokio::test]
async fn test_invalid_records_are_settled_without_writes() {
    let harness = Harness::new();
    harness.spawn_consumer().await;
    let topic = harness.config.messaging.authors_topic.clone();

    let no_header = OutboundRecord::new(
        topic.as_str(),
        br#"{"username":"alice","firstName":"A","active":true}"#.to_vec(),
    );
    let malformed = OutboundRecord::new(topic.as_str(), b"not json".to_vec())
        .with_header("correlationId", "corr-1");
    let blank_name = OutboundRecord::new(
        topic.as_str(),
        br#"{"username":"bob","firstName":" ","active":true}"#.to_vec(),
    )
    .with_header("correlationId", "corr-2");

    for record in [no_header, malformed, blank_name] {
        harness.broker.publish(record).await.unwrap();
    }

    assert!(harness.wait_for_acked(3).await);
    assert_eq!(harness.store.author_upsert_count(), 0);
    assert!(harness.broker.dead_letters().is_empty());
}

#[tokio::test]
async fn test_store_outage_exhausts_redelivery_and_nacks() {
    let mut config = Config::for_test();
    config.consumer.max_retries = 2;
    config.consumer.delay_ms = 1;
    let harness = Harness::with_config(config);
    harness.store.set_fail_on_write(true).await;
    harness.spawn_consumer().await;

    harness.publish_author("alice", true).await;

    assert!(harness.wait_for_dead_letters(1).await);
    assert_eq!(harness.broker.acked_count(), 0);

    // The next record after recovery goes through.
    harness.store.set_fail_on_write(false).await;
    harness.publish_author("alice", true).await;
    assert!(harness.wait_for_author("alice", true).await);
}
