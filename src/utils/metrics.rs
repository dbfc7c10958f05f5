//! OTel-native metrics instruments.
//!
//! All instruments are lazily initialized and feature-gated behind `otel`.
//! Naming follows OTel semantic conventions (dot-separated).

use std::sync::LazyLock;

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};

static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("quill"));

// ============================================================================
// Change-event emitter
// ============================================================================

/// Total emit calls by outcome.
pub static EMIT_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("quill.emit.total")
        .with_description("Total change-event emit calls")
        .build()
});

/// Duration of one emit call, retries included.
pub static EMIT_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("quill.emit.duration")
        .with_description("Change-event emit duration")
        .with_unit("s")
        .build()
});

// ============================================================================
// Author-sync consumer
// ============================================================================

/// Time from broker timestamp to completed processing.
pub static CONSUMER_LATENCY: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("quill.consumer.latency")
        .with_description("Author record latency from broker timestamp to completion")
        .with_unit("s")
        .build()
});

/// Total inbound author records by outcome.
pub static CONSUMER_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("quill.consumer.total")
        .with_description("Total author records processed")
        .build()
});

// ============================================================================
// Helper
// ============================================================================

/// Create an outcome label.
pub fn outcome_attr(outcome: &str) -> KeyValue {
    KeyValue::new("outcome", outcome.to_string())
}

/// Create a topic label.
pub fn topic_attr(topic: &str) -> KeyValue {
    KeyValue::new("topic", topic.to_string())
}
