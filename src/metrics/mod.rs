//! Prometheus metrics for board delivery.
//!
//! This module provides metrics for monitoring the courier:
//! - Queue metrics (size, enqueued, rejected, evicted)
//! - Delivery metrics (delivered, failed, conflicts, latency, state)
//! - Board API request outcomes
//! - State store errors
//! - Background run outcomes

mod helpers;

pub use helpers::{
    encode_metrics, ApiMetrics, BackgroundMetrics, DeliveryMetrics, QueueMetrics, StoreMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "courier";

lazy_static! {
    // ============================================================================
    // Queue Metrics
    // ============================================================================

    /// Records currently held by the queue
    pub static ref QUEUE_SIZE: IntGauge = register_int_gauge!(
        format!("{}_queue_size", METRIC_PREFIX),
        "Number of messages currently in the delivery queue"
    ).unwrap();

    /// Messages accepted into the queue
    pub static ref QUEUE_ENQUEUED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_queue_enqueued_total", METRIC_PREFIX),
        "Total messages accepted into the queue"
    ).unwrap();

    /// Messages refused by the queue, by reason
    pub static ref QUEUE_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_queue_rejected_total", METRIC_PREFIX),
        "Total messages rejected by the queue",
        &["reason"]
    ).unwrap();

    /// Stale messages evicted
    pub static ref QUEUE_EVICTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_queue_evicted_total", METRIC_PREFIX),
        "Total stale messages evicted from the queue"
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Messages that reached the board
    pub static ref DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_delivered_total", METRIC_PREFIX),
        "Total messages delivered to the board"
    ).unwrap();

    /// Failed attempts, by error kind and retryability
    pub static ref FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_failed_total", METRIC_PREFIX),
        "Total failed delivery attempts",
        &["kind", "retryable"]
    ).unwrap();

    /// Conflicts detected before posting
    pub static ref CONFLICTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_conflicts_total", METRIC_PREFIX),
        "Total board conflicts detected"
    ).unwrap();

    /// Time from dequeue to confirmed post
    pub static ref DELIVERY_LATENCY: Histogram = register_histogram!(
        format!("{}_delivery_latency_seconds", METRIC_PREFIX),
        "Delivery latency in seconds",
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    /// Aggregate queue state (0=idle, 1=pending, 2=delivering, 3=waiting_for_network, 4=has_failed)
    pub static ref QUEUE_STATE: IntGauge = register_int_gauge!(
        format!("{}_queue_state", METRIC_PREFIX),
        "Aggregate queue state (0=idle, 1=pending, 2=delivering, 3=waiting_for_network, 4=has_failed)"
    ).unwrap();

    // ============================================================================
    // Board API Metrics
    // ============================================================================

    /// Board API requests by operation and outcome
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_api_requests_total", METRIC_PREFIX),
        "Total board API requests",
        &["operation", "outcome"]
    ).unwrap();

    // ============================================================================
    // Storage Metrics
    // ============================================================================

    /// State store failures by backend and operation
    pub static ref STORE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_store_errors_total", METRIC_PREFIX),
        "Total state store errors",
        &["backend", "operation"]
    ).unwrap();

    // ============================================================================
    // Background Metrics
    // ============================================================================

    /// Background runs by outcome
    pub static ref BACKGROUND_RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_background_runs_total", METRIC_PREFIX),
        "Total background processing runs",
        &["outcome"]
    ).unwrap();
}
