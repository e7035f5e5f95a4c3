use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::HubError;
use crate::metrics::{ConnectionMetrics, FanOutMetrics};

use super::stats::{ConnectionStats, DocumentPresence};
use super::types::{
    ConnectionHandle, ConnectionId, ConnectionKind, DocumentId, OutboundFrame, SendFailure,
};

/// Outcome of a fan-out to several connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    /// Number of connections the frame was queued for
    pub delivered_to: usize,
    /// Number of connections that could not take the frame
    pub failed: usize,
}

/// Tracks every live connection, which documents are being edited by whom,
/// and which documents each notification connection is watching.
///
/// Invariants:
/// - a document id is a key of `documents` iff its editor set is non-empty
/// - a connection id is a key of `subscriptions` iff it is a registered
///   notification connection
pub struct ConnectionRegistry {
    /// connection_id -> ConnectionHandle
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    /// document_id -> Set<connection_id> currently editing it
    documents: DashMap<DocumentId, HashSet<ConnectionId>>,
    /// connection_id -> Set<document_id> it wants notifications for
    subscriptions: DashMap<ConnectionId, HashSet<DocumentId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            documents: DashMap::new(),
            subscriptions: DashMap::new(),
        }
    }

    /// Register a connection handle
    pub fn register(&self, handle: Arc<ConnectionHandle>) {
        ConnectionMetrics::record_opened(handle.kind.label());
        tracing::debug!(connection_id = %handle.id, kind = handle.kind.label(), "Connection registered");
        self.connections.insert(handle.id, handle);
    }

    /// Remove a connection handle.
    ///
    /// Callers are expected to have already removed the connection from its
    /// document and subscription sets.
    pub fn unregister(&self, connection_id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let (_, handle) = self.connections.remove(&connection_id)?;
        ConnectionMetrics::record_closed(handle.kind.label());
        tracing::debug!(connection_id = %connection_id, kind = handle.kind.label(), "Connection unregistered");
        Some(handle)
    }

    /// Get connection by ID
    pub fn get_connection(&self, connection_id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    /// Get all connections
    pub fn get_all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // ------------------------------------------------------------------
    // Active documents
    // ------------------------------------------------------------------

    /// Add a connection to a document's editor set, creating the set if absent
    pub fn join(&self, document_id: DocumentId, connection_id: ConnectionId) {
        self.documents
            .entry(document_id)
            .or_default()
            .insert(connection_id);
        ConnectionMetrics::set_active_documents(self.documents.len());
    }

    /// Remove a connection from a document's editor set.
    ///
    /// Returns `true` when the connection was the last editor and the
    /// document entry was pruned.
    pub fn leave(&self, document_id: DocumentId, connection_id: ConnectionId) -> bool {
        let pruned = match self.documents.get_mut(&document_id) {
            Some(mut editors) => {
                editors.remove(&connection_id);
                if editors.is_empty() {
                    drop(editors);
                    self.documents
                        .remove_if(&document_id, |_, editors| editors.is_empty())
                        .is_some()
                } else {
                    false
                }
            }
            None => false,
        };
        ConnectionMetrics::set_active_documents(self.documents.len());
        pruned
    }

    pub fn is_document_active(&self, document_id: DocumentId) -> bool {
        self.documents.contains_key(&document_id)
    }

    /// Ids of the connections editing a document
    pub fn document_members(&self, document_id: DocumentId) -> HashSet<ConnectionId> {
        self.documents
            .get(&document_id)
            .map(|editors| editors.clone())
            .unwrap_or_default()
    }

    /// Get all connections editing a document
    pub fn document_connections(&self, document_id: DocumentId) -> Vec<Arc<ConnectionHandle>> {
        let members = self.document_members(document_id);
        self.resolve(members)
    }

    /// Queue a frame for every editor of a document except `exclude`.
    ///
    /// Each recipient is tried independently; a full or closed queue only
    /// counts as a failure for that recipient.
    pub fn broadcast_to_document(
        &self,
        document_id: DocumentId,
        frame: OutboundFrame,
        exclude: Option<ConnectionId>,
    ) -> DeliveryResult {
        let recipients = self.document_connections(document_id);
        let result = fan_out(&recipients, &frame, exclude);
        FanOutMetrics::record("document", result.delivered_to, result.failed);
        result
    }

    // ------------------------------------------------------------------
    // Notification subscriptions
    // ------------------------------------------------------------------

    /// Register a notification connection with its initial interest set
    pub fn register_subscriber(
        &self,
        connection_id: ConnectionId,
        documents: impl IntoIterator<Item = DocumentId>,
    ) {
        self.subscriptions
            .entry(connection_id)
            .or_default()
            .extend(documents);
    }

    /// Add a document to an already registered notification connection.
    ///
    /// Returns whether the document was newly added.
    pub fn subscribe(&self, connection_id: ConnectionId, document_id: DocumentId) -> Result<bool, HubError> {
        let mut interests = self
            .subscriptions
            .get_mut(&connection_id)
            .ok_or(HubError::NotRegistered(connection_id))?;
        Ok(interests.insert(document_id))
    }

    /// Drop a connection's entire interest set
    pub fn unsubscribe_all(&self, connection_id: ConnectionId) -> Option<HashSet<DocumentId>> {
        self.subscriptions
            .remove(&connection_id)
            .map(|(_, documents)| documents)
    }

    pub fn is_subscriber(&self, connection_id: ConnectionId) -> bool {
        self.subscriptions.contains_key(&connection_id)
    }

    /// Documents a notification connection is watching, sorted
    pub fn subscribed_documents(&self, connection_id: ConnectionId) -> Option<Vec<DocumentId>> {
        self.subscriptions.get(&connection_id).map(|documents| {
            let mut documents: Vec<_> = documents.iter().copied().collect();
            documents.sort_unstable();
            documents
        })
    }

    /// Notification connections interested in `document_id`.
    ///
    /// `None` selects every notification connection.
    pub fn subscribers_for(&self, document_id: Option<DocumentId>) -> Vec<Arc<ConnectionHandle>> {
        let ids: Vec<ConnectionId> = self
            .subscriptions
            .iter()
            .filter(|entry| match document_id {
                Some(id) => entry.value().contains(&id),
                None => true,
            })
            .map(|entry| *entry.key())
            .collect();
        self.resolve(ids)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Presence for one document, if anyone is editing or watching it
    pub fn presence(&self, document_id: DocumentId) -> Option<DocumentPresence> {
        let editors = self.documents.get(&document_id).map_or(0, |e| e.len());
        let watchers = self
            .subscriptions
            .iter()
            .filter(|entry| entry.value().contains(&document_id))
            .count();

        (editors > 0 || watchers > 0).then_some(DocumentPresence {
            file_id: document_id,
            editors,
            watchers,
        })
    }

    /// All documents with at least one editor, sorted by id
    pub fn active_documents(&self) -> Vec<DocumentPresence> {
        let mut ids: Vec<DocumentId> = self.documents.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.presence(id)).collect()
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionStats {
        let document_connections = self
            .connections
            .iter()
            .filter(|entry| matches!(entry.value().kind, ConnectionKind::Document(_)))
            .count();
        let oldest_connected_at = self
            .connections
            .iter()
            .map(|entry| entry.value().connected_at)
            .min();
        let watched: HashSet<DocumentId> = self
            .subscriptions
            .iter()
            .flat_map(|entry| entry.value().iter().copied().collect::<Vec<_>>())
            .collect();

        ConnectionStats {
            total_connections: self.connections.len(),
            document_connections,
            notification_connections: self.subscriptions.len(),
            active_documents: self.documents.len(),
            watched_documents: watched.len(),
            oldest_connected_at,
        }
    }

    fn resolve(&self, ids: impl IntoIterator<Item = ConnectionId>) -> Vec<Arc<ConnectionHandle>> {
        ids.into_iter()
            .filter_map(|id| self.connections.get(&id).map(|h| h.clone()))
            .collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue `frame` for every recipient except `exclude`, best effort per recipient
pub(crate) fn fan_out(
    recipients: &[Arc<ConnectionHandle>],
    frame: &OutboundFrame,
    exclude: Option<ConnectionId>,
) -> DeliveryResult {
    let mut result = DeliveryResult::default();

    for handle in recipients {
        if Some(handle.id) == exclude {
            continue;
        }
        match handle.try_send(frame.clone()) {
            Ok(()) => result.delivered_to += 1,
            Err(SendFailure::Full) => {
                result.failed += 1;
                tracing::warn!(connection_id = %handle.id, "Outbound queue full, dropping frame");
            }
            Err(SendFailure::Closed) => {
                result.failed += 1;
                tracing::debug!(connection_id = %handle.id, "Connection already closed, skipping");
            }
        }
    }

    result
}
