//! Session guards that guarantee registry cleanup on every exit path.
//!
//! A guard is created when a connection joins the hub and releases the
//! connection's registry state exactly once: either explicitly through
//! `close`, or when the guard is dropped (task end, cancellation, panic).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;

use crate::connection_manager::{ConnectionHandle, ConnectionId, DocumentId, OutboundFrame};

use super::{CollabHub, PublishOutcome, RelayOutcome};

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the connection or the stream ended
    PeerClosed,
    /// The transport failed; the server closes its side actively
    TransportError(String),
}

impl CloseReason {
    pub fn is_error(&self) -> bool {
        matches!(self, CloseReason::TransportError(_))
    }
}

/// Owns one connection's membership in the hub
pub struct SessionGuard {
    hub: Arc<CollabHub>,
    handle: Arc<ConnectionHandle>,
    released: AtomicBool,
}

impl SessionGuard {
    pub(crate) fn new(hub: Arc<CollabHub>, handle: Arc<ConnectionHandle>) -> Self {
        Self {
            hub,
            handle,
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }

    pub fn handle(&self) -> &Arc<ConnectionHandle> {
        &self.handle
    }

    pub fn hub(&self) -> &Arc<CollabHub> {
        &self.hub
    }

    /// Release registry state now.
    ///
    /// On a transport error the connection is also asked to close; an
    /// already closed transport is tolerated.
    pub fn close(self, reason: &CloseReason) {
        self.release();
        if reason.is_error() && self.handle.try_send(OutboundFrame::Close).is_err() {
            tracing::debug!(connection_id = %self.handle.id, "Transport already closed");
        }
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.hub.release(&self.handle);
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// A connection editing one document
pub struct DocumentSession {
    guard: SessionGuard,
    document_id: DocumentId,
}

impl DocumentSession {
    pub(crate) fn new(guard: SessionGuard, document_id: DocumentId) -> Self {
        Self { guard, document_id }
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn id(&self) -> ConnectionId {
        self.guard.id()
    }

    pub fn handle(&self) -> &Arc<ConnectionHandle> {
        self.guard.handle()
    }

    /// Relay an inbound edit frame to the other editors of the document
    pub fn relay(&self, text: impl Into<Utf8Bytes>) -> RelayOutcome {
        self.guard.hub().relay(self.handle(), self.document_id, text)
    }

    pub fn close(self, reason: &CloseReason) {
        self.guard.close(reason);
    }
}

/// A connection listening for notification events
pub struct NotificationSession {
    guard: SessionGuard,
    home_document: DocumentId,
}

impl NotificationSession {
    pub(crate) fn new(guard: SessionGuard, home_document: DocumentId) -> Self {
        Self {
            guard,
            home_document,
        }
    }

    /// Document id the connection was opened for
    pub fn home_document(&self) -> DocumentId {
        self.home_document
    }

    pub fn id(&self) -> ConnectionId {
        self.guard.id()
    }

    pub fn handle(&self) -> &Arc<ConnectionHandle> {
        self.guard.handle()
    }

    /// Publish an inbound notification frame to the other subscribers
    pub fn publish(&self, text: &str) -> PublishOutcome {
        self.guard
            .hub()
            .publish(self.handle(), self.home_document, text)
    }

    pub fn close(self, reason: &CloseReason) {
        self.guard.close(reason);
    }
}
