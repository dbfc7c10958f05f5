use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::bus::MockBroker;
use crate::config::{BulkheadConfig, CircuitBreakerConfig, EmitRetryConfig};
use crate::model::Action;
use crate::test_utils::make_post;

fn event() -> ChangeEvent {
    ChangeEvent::created(&make_post("p1", "alice", 0, true))
}

fn single_attempt() -> EmitRetryConfig {
    EmitRetryConfig {
        max_attempts: 1,
        ..EmitRetryConfig::default()
    }
}

fn emitter_with(config: EmitterConfig) -> (Arc<ChangeEventEmitter>, Arc<MockBroker>) {
    let broker = Arc::new(MockBroker::new());
    let emitter = ChangeEventEmitter::new(broker.clone(), "posts", "correlationId", config);
    (Arc::new(emitter), broker)
}

#[tokio::test]
async fn test_emit_publishes_record() {
    let (emitter, broker) = emitter_with(EmitterConfig::default());

    emitter.emit("corr-1", &event()).await.unwrap();

    let published = broker.published().await;
    assert_eq!(published.len(), 1);
    let record = &published[0];
    assert_eq!(record.topic, "posts");
    assert_eq!(record.key.as_deref(), Some("p1"));
    assert_eq!(record.headers.get_str("correlationId"), Some("corr-1"));

    let body: serde_json::Value = serde_json::from_slice(&record.value).unwrap();
    assert_eq!(body["id"], "p1");
    assert_eq!(body["action"], "CREATED");
    assert_eq!(body["authorUsername"], "alice");
    assert!(body.get("correlationId").is_none());
}

#[tokio::test]
async fn test_blank_correlation_id_rejected_before_broker() {
    let (emitter, broker) = emitter_with(EmitterConfig::default());

    for blank in ["", "   "] {
        let err = emitter.emit(blank, &event()).await.unwrap_err();
        assert!(matches!(
            err,
            EmitError::Validation(ValidationError::BlankCorrelationId)
        ));
        assert!(!err.is_retryable());
    }
    assert!(emitter.emit_detached(" ", event()).is_err());
    assert_eq!(broker.publish_attempts(), 0);
}

#[tokio::test]
async fn test_correlation_id_is_trimmed() {
    let (emitter, broker) = emitter_with(EmitterConfig::default());

    emitter.emit("  corr-2 ", &event()).await.unwrap();

    let published = broker.published().await;
    assert_eq!(published[0].headers.get_str("correlationId"), Some("corr-2"));
}

#[tokio::test(start_paused = true)]
async fn test_nack_is_retried_until_ack() {
    let (emitter, broker) = emitter_with(EmitterConfig::default());
    broker.fail_next(2).await;

    emitter.emit("corr-1", &event()).await.unwrap();

    assert_eq!(broker.publish_attempts(), 3);
    assert_eq!(broker.published_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_retries_stop_at_max_attempts() {
    let (emitter, broker) = emitter_with(EmitterConfig::default());
    broker.set_fail_on_publish(true).await;

    let err = emitter.emit("corr-1", &event()).await.unwrap_err();

    assert!(matches!(err, EmitError::Nack(_)));
    assert_eq!(broker.publish_attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_waits_between_attempts() {
    let (emitter, broker) = emitter_with(EmitterConfig::default());
    broker.fail_next(1).await;

    let start = tokio::time::Instant::now();
    emitter.emit("corr-1", &event()).await.unwrap();

    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_breaker_opens_and_fails_fast() {
    let (emitter, broker) = emitter_with(EmitterConfig {
        circuit_breaker: CircuitBreakerConfig {
            request_volume_threshold: 4,
            failure_ratio: 0.5,
            delay_ms: 500,
        },
        retry: single_attempt(),
        ..EmitterConfig::default()
    });
    broker.set_fail_on_publish(true).await;

    for _ in 0..4 {
        assert!(matches!(
            emitter.emit("corr-1", &event()).await,
            Err(EmitError::Nack(_))
        ));
    }
    assert_eq!(emitter.breaker_state(), BreakerState::Open);

    let err = emitter.emit("corr-1", &event()).await.unwrap_err();
    assert!(matches!(err, EmitError::CircuitOpen));
    assert!(!err.is_retryable());
    assert_eq!(broker.publish_attempts(), 4);

    broker.set_fail_on_publish(false).await;
    tokio::time::advance(Duration::from_millis(500)).await;

    emitter.emit("corr-1", &event()).await.unwrap();
    assert_eq!(emitter.breaker_state(), BreakerState::Closed);
    assert_eq!(broker.published_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_is_not_retried() {
    let (emitter, broker) = emitter_with(EmitterConfig {
        circuit_breaker: CircuitBreakerConfig {
            request_volume_threshold: 2,
            failure_ratio: 1.0,
            delay_ms: 60_000,
        },
        ..EmitterConfig::default()
    });
    broker.set_fail_on_publish(true).await;

    // Two nacks open the breaker; the third attempt is refused and ends the
    // retry loop.
    let err = emitter.emit("corr-1", &event()).await.unwrap_err();

    assert!(matches!(err, EmitError::CircuitOpen));
    assert_eq!(broker.publish_attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_bulkhead_rejects_excess_emits() {
    let (emitter, broker) = emitter_with(EmitterConfig {
        bulkhead: BulkheadConfig { max_concurrent: 1 },
        ..EmitterConfig::default()
    });
    broker.set_latency(Some(Duration::from_millis(100))).await;

    let first = emitter.emit_detached("corr-1", event()).unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(emitter.in_flight(), 1);

    let err = emitter.emit("corr-2", &event()).await.unwrap_err();
    assert!(matches!(err, EmitError::BulkheadFull));

    first.await.unwrap().unwrap();
    assert_eq!(emitter.in_flight(), 0);
    assert_eq!(broker.published_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_broker_serves_concurrent_emits() {
    let (emitter, broker) = emitter_with(EmitterConfig {
        retry: single_attempt(),
        ..EmitterConfig::default()
    });
    broker.set_latency(Some(Duration::from_millis(300))).await;

    let start = tokio::time::Instant::now();
    let handles: Vec<_> = (0..10)
        .map(|i| emitter.emit_detached(&format!("corr-{i}"), event()).unwrap())
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // All ten publishes overlap instead of queueing behind each other.
    assert!(start.elapsed() < Duration::from_millis(600));
    assert_eq!(emitter.breaker_state(), BreakerState::Closed);
    assert_eq!(broker.publish_attempts(), 10);
    assert_eq!(broker.published_count().await, 10);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_publishes_capped_by_bulkhead() {
    let (emitter, broker) = emitter_with(EmitterConfig {
        retry: single_attempt(),
        bulkhead: BulkheadConfig { max_concurrent: 2 },
        ..EmitterConfig::default()
    });
    broker.set_latency(Some(Duration::from_millis(100))).await;

    let first = emitter.emit_detached("corr-1", event()).unwrap();
    let second = emitter.emit_detached("corr-2", event()).unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(emitter.in_flight(), 2);
    assert_eq!(broker.publish_attempts(), 2);

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    assert_eq!(broker.published_count().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_attempts_do_not_publish_late() {
    let (emitter, broker) = emitter_with(EmitterConfig::default());
    broker.set_latency(Some(Duration::from_millis(1500))).await;

    let err = emitter.emit("corr-1", &event()).await.unwrap_err();
    assert!(matches!(err, EmitError::Timeout(_)));
    assert_eq!(broker.publish_attempts(), 5);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(broker.published_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_one_emit_publishes_once() {
    let (emitter, broker) = emitter_with(EmitterConfig::default());
    broker.set_latency(Some(Duration::from_millis(800))).await;

    for i in 0..3 {
        emitter.emit(&format!("corr-{i}"), &event()).await.unwrap();
    }

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(broker.publish_attempts(), 3);
    assert_eq!(broker.published_count().await, 3);
    assert_eq!(emitter.breaker_state(), BreakerState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_slow_ack_times_out() {
    let (emitter, broker) = emitter_with(EmitterConfig {
        retry: single_attempt(),
        ..EmitterConfig::default()
    });
    broker.set_latency(Some(Duration::from_secs(5))).await;

    let err = emitter.emit("corr-1", &event()).await.unwrap_err();

    assert!(matches!(err, EmitError::Timeout(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_dispatcher_preserves_submission_order() {
    let (emitter, broker) = emitter_with(EmitterConfig::default());

    for i in 0..5 {
        let post = make_post(&format!("p{i}"), "alice", i, true);
        emitter
            .emit("corr-1", &ChangeEvent::from_post(&post, Action::Updated))
            .await
            .unwrap();
    }

    let keys: Vec<_> = broker
        .published()
        .await
        .into_iter()
        .filter_map(|r| r.key)
        .collect();
    assert_eq!(keys, vec!["p0", "p1", "p2", "p3", "p4"]);
}
