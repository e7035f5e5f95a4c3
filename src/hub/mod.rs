//! The real-time collaboration hub.
//!
//! `CollabHub` owns every piece of in-process collaboration state: the
//! connection registry (document editors and notification interests), the
//! per-connection message histories used for rate limiting, and the
//! notification dispatcher. Nothing is global, so tests can run any number
//! of isolated hubs side by side.
//!
//! All operations are synchronous: registry mutations never await, and
//! fan-out only enqueues onto per-connection queues, so no lock is ever held
//! across a network send.

mod lifecycle;

pub use lifecycle::{CloseReason, DocumentSession, NotificationSession, SessionGuard};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::{HubConfig, RateLimitConfig};
use crate::connection_manager::{
    ConnectionHandle, ConnectionId, ConnectionKind, ConnectionRegistry, ConnectionStats,
    DeliveryResult, DocumentId, DocumentPresence, OutboundFrame,
};
use crate::error::HubError;
use crate::metrics::{RateLimitMetrics, RelayMetrics};
use crate::notification::{
    DispatcherStatsSnapshot, EventParseError, NotificationDispatcher, NotificationEvent,
};
use crate::ratelimit::MessageRateLimiter;

/// Notice sent to a document connection whose frame was dropped by the limiter
pub const RATE_LIMIT_NOTICE: &str = "Error: Rate limit exceeded. Please slow down.";

/// Result of relaying one edit frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Frame was fanned out to the other editors
    Relayed(DeliveryResult),
    /// Frame was dropped and the sender notified
    RateLimited,
}

/// Result of publishing one notification frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Event was fanned out to interested subscribers
    Published(DeliveryResult),
    /// Frame was malformed; the sender received an error event
    Rejected(EventParseError),
}

/// Hub-wide statistics
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub connections: ConnectionStats,
    pub notifications: DispatcherStatsSnapshot,
    pub rate_limited_connections: usize,
}

pub struct CollabHub {
    registry: Arc<ConnectionRegistry>,
    rate_limiter: MessageRateLimiter,
    dispatcher: NotificationDispatcher,
    next_connection_id: AtomicU64,
    config: HubConfig,
}

impl CollabHub {
    pub fn new(config: HubConfig, rate_limit: RateLimitConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = NotificationDispatcher::new(registry.clone());

        Self {
            registry,
            rate_limiter: MessageRateLimiter::new(rate_limit),
            dispatcher,
            next_connection_id: AtomicU64::new(1),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn rate_limiter(&self) -> &MessageRateLimiter {
        &self.rate_limiter
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Create an outbound queue sized for one connection
    pub fn channel(&self) -> (mpsc::Sender<OutboundFrame>, mpsc::Receiver<OutboundFrame>) {
        mpsc::channel(self.config.channel_buffer_size.max(1))
    }

    fn next_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Join a document: register the connection, start its message history
    /// and announce `user_joined` to the document's watchers.
    #[tracing::instrument(name = "hub.join_document", skip(self, sender))]
    pub fn join_document(
        self: &Arc<Self>,
        document_id: DocumentId,
        sender: mpsc::Sender<OutboundFrame>,
    ) -> DocumentSession {
        let id = self.next_id();
        let handle = Arc::new(ConnectionHandle::new(
            id,
            ConnectionKind::Document(document_id),
            sender,
        ));

        self.registry.register(handle.clone());
        self.registry.join(document_id, id);
        self.rate_limiter.track(id);

        tracing::info!(connection_id = %id, file_id = document_id, "New connection for document");

        self.dispatcher.broadcast_notification(
            &NotificationEvent::user_joined(document_id),
            Some(document_id),
            None,
        );

        DocumentSession::new(SessionGuard::new(self.clone(), handle), document_id)
    }

    /// Relay one edit frame from `sender` to the other editors of the document
    pub fn relay(
        &self,
        sender: &ConnectionHandle,
        document_id: DocumentId,
        text: impl Into<Utf8Bytes>,
    ) -> RelayOutcome {
        if !self.rate_limiter.record_and_check(sender.id).is_allowed() {
            RateLimitMetrics::record_denied();
            tracing::warn!(
                connection_id = %sender.id,
                file_id = document_id,
                "Rate limit exceeded"
            );
            if sender.send_text(RATE_LIMIT_NOTICE).is_err() {
                tracing::debug!(connection_id = %sender.id, "Could not deliver rate limit notice");
            }
            return RelayOutcome::RateLimited;
        }
        RateLimitMetrics::record_allowed();

        let frame = OutboundFrame::text(text);
        let result = self
            .registry
            .broadcast_to_document(document_id, frame, Some(sender.id));
        RelayMetrics::record_relayed();

        tracing::debug!(
            connection_id = %sender.id,
            file_id = document_id,
            delivered = result.delivered_to,
            failed = result.failed,
            "Relayed edit"
        );

        RelayOutcome::Relayed(result)
    }

    /// Open a notification connection watching `document_id`.
    ///
    /// The connection is greeted with a `connected` event carrying its
    /// connection id, which clients use to subscribe to further documents.
    #[tracing::instrument(name = "hub.open_notifications", skip(self, sender))]
    pub fn open_notifications(
        self: &Arc<Self>,
        document_id: DocumentId,
        sender: mpsc::Sender<OutboundFrame>,
    ) -> NotificationSession {
        let id = self.next_id();
        let handle = Arc::new(ConnectionHandle::new(id, ConnectionKind::Notifications, sender));

        self.registry.register(handle.clone());
        self.registry.register_subscriber(id, [document_id]);

        tracing::info!(connection_id = %id, file_id = document_id, "Notification connection opened");

        send_event(&handle, &NotificationEvent::connected(document_id, id));

        NotificationSession::new(SessionGuard::new(self.clone(), handle), document_id)
    }

    /// Parse a client notification frame and fan it out to the other
    /// subscribers of its document.
    pub fn publish(
        &self,
        sender: &ConnectionHandle,
        default_document: DocumentId,
        text: &str,
    ) -> PublishOutcome {
        let event = match NotificationEvent::from_client_frame(text, default_document) {
            Ok(event) => event,
            Err(e) => {
                self.dispatcher.record_malformed();
                tracing::warn!(connection_id = %sender.id, error = %e, "Malformed notification frame");
                send_event(sender, &NotificationEvent::error(e.to_string()));
                return PublishOutcome::Rejected(e);
            }
        };

        // An explicit file_id that names no document reaches nobody
        let Some(document_id) = event.file_id else {
            tracing::warn!(connection_id = %sender.id, "Notification file_id names no document");
            return PublishOutcome::Published(DeliveryResult::default());
        };

        let result = self
            .dispatcher
            .broadcast_notification(&event, Some(document_id), Some(sender.id));
        PublishOutcome::Published(result)
    }

    /// Fan an event out to notification subscribers (`None` = everyone)
    pub fn broadcast_notification(
        &self,
        event: &NotificationEvent,
        document_id: Option<DocumentId>,
        exclude: Option<ConnectionId>,
    ) -> DeliveryResult {
        self.dispatcher
            .broadcast_notification(event, document_id, exclude)
    }

    /// Add a document to an open notification connection's interest set
    pub fn subscribe_additional(
        &self,
        connection_id: ConnectionId,
        document_id: DocumentId,
    ) -> Result<(), HubError> {
        let added = self.registry.subscribe(connection_id, document_id)?;
        tracing::info!(
            connection_id = %connection_id,
            file_id = document_id,
            newly_added = added,
            "Subscribed to additional document"
        );
        Ok(())
    }

    /// Remove every trace of a connection from the hub.
    ///
    /// Document connections also announce `user_left` to the document's
    /// watchers; notification connections leave silently.
    pub(crate) fn release(&self, handle: &ConnectionHandle) {
        match handle.kind {
            ConnectionKind::Document(document_id) => {
                let pruned = self.registry.leave(document_id, handle.id);
                self.rate_limiter.forget(handle.id);
                self.registry.unregister(handle.id);

                tracing::info!(
                    connection_id = %handle.id,
                    file_id = document_id,
                    document_pruned = pruned,
                    "Connection left document"
                );

                self.dispatcher.broadcast_notification(
                    &NotificationEvent::user_left(document_id),
                    Some(document_id),
                    None,
                );
            }
            ConnectionKind::Notifications => {
                self.registry.unsubscribe_all(handle.id);
                self.registry.unregister(handle.id);

                tracing::info!(connection_id = %handle.id, "Notification connection closed");
            }
        }
    }

    pub fn document_presence(&self, document_id: DocumentId) -> Option<DocumentPresence> {
        self.registry.presence(document_id)
    }

    pub fn active_documents(&self) -> Vec<DocumentPresence> {
        self.registry.active_documents()
    }

    /// Get statistics
    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.registry.stats(),
            notifications: self.dispatcher.stats(),
            rate_limited_connections: self.rate_limiter.tracked_connections(),
        }
    }
}

/// Best-effort delivery of a single event to one connection
pub(crate) fn send_event(handle: &ConnectionHandle, event: &NotificationEvent) {
    match event.to_frame() {
        Ok(frame) => {
            if handle.try_send(frame).is_err() {
                tracing::debug!(connection_id = %handle.id, event_type = event.kind(), "Could not deliver event");
            }
        }
        Err(e) => tracing::error!(error = %e, "Failed to serialize event"),
    }
}
