//! Connection statistics and info structures

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::DocumentId;

/// Registry statistics
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub document_connections: usize,
    pub notification_connections: usize,
    pub active_documents: usize,
    pub watched_documents: usize,
    /// When the longest-lived open connection was accepted
    pub oldest_connected_at: Option<DateTime<Utc>>,
}

/// Presence information for one document
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DocumentPresence {
    pub file_id: DocumentId,
    pub editors: usize,
    pub watchers: usize,
}
