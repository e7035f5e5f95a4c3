use axum::{routing::get, Router};

use crate::server::AppState;

use super::documents::{get_document, list_documents};
use super::health::{health, root, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/", get(root))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Presence
        .nest(
            "/api/v1",
            Router::new()
                .route("/documents", get(list_documents))
                .route("/documents/{document_id}", get(get_document)),
        )
}
