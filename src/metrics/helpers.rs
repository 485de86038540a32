//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    API_REQUESTS_TOTAL, BACKGROUND_RUNS_TOTAL, CONFLICTS_TOTAL, DELIVERED_TOTAL, DELIVERY_LATENCY,
    FAILED_TOTAL, QUEUE_ENQUEUED_TOTAL, QUEUE_EVICTED_TOTAL, QUEUE_REJECTED_TOTAL, QUEUE_SIZE,
    QUEUE_STATE, STORE_ERRORS_TOTAL,
};
use crate::delivery::QueueState;

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording queue metrics
pub struct QueueMetrics;

impl QueueMetrics {
    /// Record an accepted message
    pub fn enqueued() {
        QUEUE_ENQUEUED_TOTAL.inc();
    }

    /// Record a refused message
    pub fn rejected(reason: &str) {
        QUEUE_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record evicted stale messages
    pub fn evicted(count: usize) {
        QUEUE_EVICTED_TOTAL.inc_by(count as u64);
    }

    /// Set the current queue size
    pub fn set_size(size: usize) {
        QUEUE_SIZE.set(size as i64);
    }
}

/// Helper struct for recording delivery metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    /// Record a delivered message and its latency
    pub fn delivered(latency_secs: f64) {
        DELIVERED_TOTAL.inc();
        DELIVERY_LATENCY.observe(latency_secs);
    }

    /// Record a failed attempt
    pub fn failed(kind: &str, retryable: bool) {
        let retryable = if retryable { "true" } else { "false" };
        FAILED_TOTAL.with_label_values(&[kind, retryable]).inc();
    }

    /// Record a detected conflict
    pub fn conflict() {
        CONFLICTS_TOTAL.inc();
    }

    /// Publish the aggregate state
    pub fn set_state(state: QueueState) {
        QUEUE_STATE.set(state.gauge_value());
    }
}

/// Helper struct for recording board API metrics
pub struct ApiMetrics;

impl ApiMetrics {
    pub fn request(operation: &str, outcome: &str) {
        API_REQUESTS_TOTAL
            .with_label_values(&[operation, outcome])
            .inc();
    }
}

/// Helper struct for recording state store metrics
pub struct StoreMetrics;

impl StoreMetrics {
    pub fn error(backend: &str, operation: &str) {
        STORE_ERRORS_TOTAL
            .with_label_values(&[backend, operation])
            .inc();
    }
}

/// Helper struct for recording background run metrics
pub struct BackgroundMetrics;

impl BackgroundMetrics {
    pub fn run(outcome: &str) {
        BACKGROUND_RUNS_TOTAL.with_label_values(&[outcome]).inc();
    }
}
