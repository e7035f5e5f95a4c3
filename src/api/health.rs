//! Welcome, health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::connection_manager::{ConnectionStats, DocumentPresence};
use crate::notification::DispatcherStatsSnapshot;
use crate::server::AppState;

const WELCOME_MESSAGE: &str = "Welcome to the real time Code Editor with AI support";

#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStats,
    pub documents: Vec<DocumentPresence>,
    pub notifications: DispatcherStatsSnapshot,
    pub rate_limited_connections: usize,
}

pub async fn root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: WELCOME_MESSAGE.to_string(),
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: state.hub.registry().connection_count(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let hub_stats = state.hub.stats();

    Json(StatsResponse {
        connections: hub_stats.connections,
        documents: state.hub.active_documents(),
        notifications: hub_stats.notifications,
        rate_limited_connections: hub_stats.rate_limited_connections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn test_state() -> AppState {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        AppState::new(settings)
    }

    #[tokio::test]
    async fn test_root_welcome() {
        let Json(body) = root().await;
        assert_eq!(body.message, WELCOME_MESSAGE);
    }

    #[tokio::test]
    async fn test_health_reports_connections() {
        let state = test_state();
        let (tx, _rx) = state.hub.channel();
        let _session = state.hub.join_document(3, tx);

        let Json(body) = health(State(state)).await;
        assert_eq!(body.status, "healthy");
        assert_eq!(body.connections, 1);
    }

    #[tokio::test]
    async fn test_stats_lists_documents() {
        let state = test_state();
        let (tx, _rx) = state.hub.channel();
        let _session = state.hub.join_document(9, tx);

        let Json(body) = stats(State(state)).await;
        assert_eq!(body.connections.document_connections, 1);
        assert_eq!(body.documents.len(), 1);
        assert_eq!(body.documents[0].file_id, 9);
        assert_eq!(body.rate_limited_connections, 1);
    }
}
