//! Document presence endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::connection_manager::{DocumentId, DocumentPresence};
use crate::error::{AppError, Result};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentPresence>,
    pub total: usize,
}

/// GET /api/v1/documents - documents with at least one editor
pub async fn list_documents(State(state): State<AppState>) -> Json<DocumentListResponse> {
    let documents = state.hub.active_documents();
    let total = documents.len();

    Json(DocumentListResponse { documents, total })
}

/// GET /api/v1/documents/{document_id} - presence for one document
pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<DocumentId>,
) -> Result<Json<DocumentPresence>> {
    state
        .hub
        .document_presence(document_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Document {} has no active connections", document_id)))
}
