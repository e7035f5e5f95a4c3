use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::connection_manager::{fan_out, ConnectionId, ConnectionRegistry, DeliveryResult, DocumentId};
use crate::metrics::{FanOutMetrics, NotificationMetrics};

use super::NotificationEvent;

/// Statistics for the notification dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Total events published
    pub total_published: AtomicU64,
    /// Events scoped to a single document
    pub document_notifications: AtomicU64,
    /// System-wide events
    pub global_notifications: AtomicU64,
    /// Total successful deliveries (connection count)
    pub total_delivered: AtomicU64,
    /// Total failed deliveries
    pub total_failed: AtomicU64,
    /// Inbound frames rejected as malformed
    pub malformed_frames: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_published: self.total_published.load(Ordering::Relaxed),
            document_notifications: self.document_notifications.load(Ordering::Relaxed),
            global_notifications: self.global_notifications.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_published: u64,
    pub document_notifications: u64,
    pub global_notifications: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub malformed_frames: u64,
}

/// Routes notification events to the notification connections that want them
pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
    stats: DispatcherStats,
}

impl NotificationDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            stats: DispatcherStats::default(),
        }
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn record_malformed(&self) {
        self.stats.malformed_frames.fetch_add(1, Ordering::Relaxed);
        NotificationMetrics::record_malformed();
    }

    /// Fan an event out to notification subscribers.
    ///
    /// With `Some(document_id)` only connections whose interest set contains
    /// that document receive it; with `None` every notification connection
    /// does. `exclude` is never delivered to.
    #[tracing::instrument(
        name = "dispatcher.broadcast",
        skip(self, event),
        fields(event_type = event.kind())
    )]
    pub fn broadcast_notification(
        &self,
        event: &NotificationEvent,
        document_id: Option<DocumentId>,
        exclude: Option<ConnectionId>,
    ) -> DeliveryResult {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize notification");
                return DeliveryResult::default();
            }
        };

        let recipients = self.registry.subscribers_for(document_id);
        let result = fan_out(&recipients, &frame, exclude);

        let scope = match document_id {
            Some(_) => {
                self.stats.document_notifications.fetch_add(1, Ordering::Relaxed);
                "notification"
            }
            None => {
                self.stats.global_notifications.fetch_add(1, Ordering::Relaxed);
                "global"
            }
        };
        self.stats.total_published.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_delivered
            .fetch_add(result.delivered_to as u64, Ordering::Relaxed);
        self.stats
            .total_failed
            .fetch_add(result.failed as u64, Ordering::Relaxed);
        NotificationMetrics::record_sent(scope);
        FanOutMetrics::record(scope, result.delivered_to, result.failed);

        tracing::debug!(
            delivered = result.delivered_to,
            failed = result.failed,
            "Notification dispatched"
        );

        result
    }
}
