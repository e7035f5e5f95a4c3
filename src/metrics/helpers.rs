//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTIONS_ACTIVE, CONNECTIONS_OPENED_TOTAL, DOCUMENTS_ACTIVE, FANOUT_DELIVERED_TOTAL,
    FANOUT_FAILED_TOTAL, FRAMES_RELAYED_TOTAL, HEARTBEAT_DURATION_MS, HEARTBEAT_FAILED_TOTAL,
    NOTIFICATIONS_MALFORMED_TOTAL, NOTIFICATIONS_SENT_TOTAL, RATELIMIT_ALLOWED_TOTAL,
    RATELIMIT_DENIED_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for connection metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened(kind: &str) {
        CONNECTIONS_OPENED_TOTAL.with_label_values(&[kind]).inc();
        CONNECTIONS_ACTIVE.with_label_values(&[kind]).inc();
    }

    pub fn record_closed(kind: &str) {
        CONNECTIONS_ACTIVE.with_label_values(&[kind]).dec();
    }

    pub fn set_active_documents(count: usize) {
        DOCUMENTS_ACTIVE.set(count as i64);
    }
}

/// Helper struct for edit relay metrics
pub struct RelayMetrics;

impl RelayMetrics {
    pub fn record_relayed() {
        FRAMES_RELAYED_TOTAL.inc();
    }
}

/// Helper struct for fan-out metrics
pub struct FanOutMetrics;

impl FanOutMetrics {
    /// Record the outcome of one fan-out ("document", "notification" or "global")
    pub fn record(scope: &str, delivered: usize, failed: usize) {
        if delivered > 0 {
            FANOUT_DELIVERED_TOTAL
                .with_label_values(&[scope])
                .inc_by(delivered as u64);
        }
        if failed > 0 {
            FANOUT_FAILED_TOTAL
                .with_label_values(&[scope])
                .inc_by(failed as u64);
        }
    }
}

/// Helper struct for notification metrics
pub struct NotificationMetrics;

impl NotificationMetrics {
    pub fn record_sent(scope: &str) {
        NOTIFICATIONS_SENT_TOTAL.with_label_values(&[scope]).inc();
    }

    pub fn record_malformed() {
        NOTIFICATIONS_MALFORMED_TOTAL.inc();
    }
}

/// Helper struct for recording rate limit metrics
pub struct RateLimitMetrics;

impl RateLimitMetrics {
    pub fn record_allowed() {
        RATELIMIT_ALLOWED_TOTAL.inc();
    }

    pub fn record_denied() {
        RATELIMIT_DENIED_TOTAL.inc();
    }
}

/// Helper struct for heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    pub fn record_duration_ms(ms: f64) {
        HEARTBEAT_DURATION_MS.observe(ms);
    }

    pub fn record_failed(count: u64) {
        HEARTBEAT_FAILED_TOTAL.inc_by(count);
    }
}
