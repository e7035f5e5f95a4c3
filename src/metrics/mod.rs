//! Prometheus metrics for the collaboration hub.
//!
//! - Connection metrics (active connections by channel kind, active documents)
//! - Relay metrics (frames relayed, fan-out deliveries and failures)
//! - Notification metrics (events sent by scope, malformed frames)
//! - Rate limiting metrics
//! - Heartbeat metrics

mod helpers;

pub use helpers::{
    encode_metrics, ConnectionMetrics, FanOutMetrics, HeartbeatMetrics, NotificationMetrics,
    RateLimitMetrics, RelayMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "collab";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Active WebSocket connections by channel kind
    pub static ref CONNECTIONS_ACTIVE: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of active WebSocket connections",
        &["kind"]
    ).unwrap();

    /// Total connections opened by channel kind
    pub static ref CONNECTIONS_OPENED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened",
        &["kind"]
    ).unwrap();

    /// Documents with at least one editor
    pub static ref DOCUMENTS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_documents_active", METRIC_PREFIX),
        "Number of documents with at least one connected editor"
    ).unwrap();

    // ============================================================================
    // Relay Metrics
    // ============================================================================

    /// Edit frames accepted for relay
    pub static ref FRAMES_RELAYED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_relayed_total", METRIC_PREFIX),
        "Total edit frames accepted for relay"
    ).unwrap();

    /// Frames queued for recipients, by fan-out scope
    pub static ref FANOUT_DELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_fanout_delivered_total", METRIC_PREFIX),
        "Total frames queued for recipients during fan-out",
        &["scope"]
    ).unwrap();

    /// Recipients skipped because their queue was full or closed
    pub static ref FANOUT_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_fanout_failed_total", METRIC_PREFIX),
        "Total recipients skipped during fan-out",
        &["scope"]
    ).unwrap();

    // ============================================================================
    // Notification Metrics
    // ============================================================================

    /// Notification events published, by scope
    pub static ref NOTIFICATIONS_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_sent_total", METRIC_PREFIX),
        "Total notification events published",
        &["scope"]
    ).unwrap();

    /// Notification frames rejected as malformed
    pub static ref NOTIFICATIONS_MALFORMED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_malformed_total", METRIC_PREFIX),
        "Total notification frames rejected as malformed"
    ).unwrap();

    // ============================================================================
    // Rate Limiting Metrics
    // ============================================================================

    /// Messages allowed by the rate limiter
    pub static ref RATELIMIT_ALLOWED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_ratelimit_allowed_total", METRIC_PREFIX),
        "Total messages allowed by the rate limiter"
    ).unwrap();

    /// Messages dropped by the rate limiter
    pub static ref RATELIMIT_DENIED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_ratelimit_denied_total", METRIC_PREFIX),
        "Total messages dropped by the rate limiter"
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    /// Heartbeat round duration
    pub static ref HEARTBEAT_DURATION_MS: Histogram = register_histogram!(
        format!("{}_heartbeat_duration_ms", METRIC_PREFIX),
        "Time taken to queue pings to all connections in milliseconds",
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0]
    ).unwrap();

    /// Pings that could not be queued
    pub static ref HEARTBEAT_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_heartbeat_failed_total", METRIC_PREFIX),
        "Total heartbeat pings that could not be queued"
    ).unwrap();
}
