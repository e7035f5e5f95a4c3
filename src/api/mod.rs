//! API layer - HTTP endpoint handlers organized by domain.

mod documents;
mod health;
mod metrics;
mod routes;

// Re-export all handlers for use in server/app.rs
pub use documents::{get_document, list_documents, DocumentListResponse};
pub use health::{health, root, stats, HealthResponse, StatsResponse, WelcomeResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
