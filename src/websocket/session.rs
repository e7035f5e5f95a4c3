//! Per-connection receive loops for the document and notification channels.
//!
//! Both loops suspend only while waiting for the next inbound frame; every
//! hub call they make runs to completion without awaiting.

use crate::connection_manager::{ConnectionId, DocumentId};
use crate::hub::{CloseReason, CollabHub, DocumentSession, NotificationSession};
use crate::notification::NotificationEvent;

use super::message::{FrameSource, Inbound};

/// Relay edit frames until the connection ends, then release it.
#[tracing::instrument(
    name = "ws.document",
    skip(session, source),
    fields(connection_id = %session.id(), file_id = session.document_id())
)]
pub async fn run_document_session<S: FrameSource>(session: DocumentSession, mut source: S) -> CloseReason {
    let reason = loop {
        match source.recv().await {
            Inbound::Message(text) => {
                session.relay(text);
            }
            Inbound::PeerClosed => {
                tracing::info!("WebSocket disconnected");
                break CloseReason::PeerClosed;
            }
            Inbound::TransportError(e) => {
                tracing::error!(error = %e, "WebSocket error");
                break CloseReason::TransportError(e);
            }
        }
    };

    session.close(&reason);
    tracing::info!("Connection closed");
    reason
}

/// Publish notification frames until the connection ends, then release it.
#[tracing::instrument(
    name = "ws.notifications",
    skip(session, source),
    fields(connection_id = %session.id(), file_id = session.home_document())
)]
pub async fn run_notification_session<S: FrameSource>(
    session: NotificationSession,
    mut source: S,
) -> CloseReason {
    let reason = loop {
        match source.recv().await {
            Inbound::Message(text) => {
                session.publish(&text);
            }
            Inbound::PeerClosed => {
                tracing::info!("Notification WebSocket disconnected");
                break CloseReason::PeerClosed;
            }
            Inbound::TransportError(e) => {
                tracing::error!(error = %e, "Notification WebSocket error");
                break CloseReason::TransportError(e);
            }
        }
    };

    session.close(&reason);
    reason
}

/// Reply for the one-shot subscribe endpoint
pub fn subscription_reply(
    hub: &CollabHub,
    connection_id: Option<ConnectionId>,
    document_id: DocumentId,
) -> NotificationEvent {
    let Some(connection_id) = connection_id else {
        return NotificationEvent::error("Missing connection_id for subscription");
    };

    match hub.subscribe_additional(connection_id, document_id) {
        Ok(()) => NotificationEvent::subscribed(document_id),
        Err(e) => {
            tracing::warn!(connection_id = %connection_id, file_id = document_id, error = %e, "Subscription rejected");
            NotificationEvent::error(e.to_string())
        }
    }
}
