//! Connection handle and related types

use std::fmt;

use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// Identifier of an editable document (the file id in request paths)
pub type DocumentId = i64;

/// Token identifying one live connection.
///
/// Issued from a monotonically increasing counter by the hub and never
/// reused while the process is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which channel a connection was opened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "file_id", rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Raw edit relay for one document
    Document(DocumentId),
    /// Structured lifecycle/notification events
    Notifications,
}

impl ConnectionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionKind::Document(_) => "document",
            ConnectionKind::Notifications => "notifications",
        }
    }
}

/// Frame queued for a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Text frame; clones share one buffer across every recipient of a fan-out
    Text(Utf8Bytes),
    /// Keep-alive ping
    Ping,
    /// Ask the writer to close the socket
    Close,
}

impl OutboundFrame {
    pub fn text(text: impl Into<Utf8Bytes>) -> Self {
        Self::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            OutboundFrame::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }
}

/// Why a single enqueue attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// Recipient queue is full (slow peer)
    Full,
    /// Recipient writer is gone
    Closed,
}

/// Handle for a single WebSocket connection.
///
/// The socket itself is owned by the transport task; the hub only keeps
/// the sending half of that task's outbound queue.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub kind: ConnectionKind,
    pub sender: mpsc::Sender<OutboundFrame>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, kind: ConnectionKind, sender: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            id,
            kind,
            sender,
            connected_at: Utc::now(),
        }
    }

    /// Enqueue a frame without waiting.
    ///
    /// Never blocks on a slow peer: a full queue is reported as a failure.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<(), SendFailure> {
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendFailure::Full,
            mpsc::error::TrySendError::Closed(_) => SendFailure::Closed,
        })
    }

    pub fn send_text(&self, text: impl Into<Utf8Bytes>) -> Result<(), SendFailure> {
        self.try_send(OutboundFrame::text(text))
    }
}
