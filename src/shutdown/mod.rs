//! Graceful shutdown handling for the collaboration hub.
//!
//! Shutdown runs in three phases:
//! 1. Queue a close frame to every connected client
//! 2. Signal background tasks to stop
//! 3. Wait for sessions to release themselves from the registry

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::ShutdownSettings;
use crate::connection_manager::OutboundFrame;
use crate::hub::CollabHub;

/// Poll interval while waiting for the registry to empty
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handles graceful shutdown of the hub
pub struct GracefulShutdown {
    hub: Arc<CollabHub>,
    shutdown_tx: broadcast::Sender<()>,
    drain_timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(
        hub: Arc<CollabHub>,
        shutdown_tx: broadcast::Sender<()>,
        settings: &ShutdownSettings,
    ) -> Self {
        Self {
            hub,
            shutdown_tx,
            drain_timeout: Duration::from_secs(settings.drain_timeout_secs),
        }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.hub.registry().connection_count())
    )]
    pub async fn execute(&self) -> ShutdownResult {
        let start = Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!("Starting graceful shutdown - Phase 1: Closing client connections");
        result.clients_notified = self.close_clients();

        tracing::info!("Phase 2: Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 3: Waiting for connections to close");
        let (closed, remaining) = self.wait_for_connections_to_close().await;
        result.connections_closed = closed;
        result.connections_remaining = remaining;

        result.duration = start.elapsed();

        tracing::info!(
            clients_notified = result.clients_notified,
            connections_closed = result.connections_closed,
            connections_remaining = result.connections_remaining,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }

    /// Queue a close frame to every connection
    fn close_clients(&self) -> usize {
        let connections = self.hub.registry().get_all_connections();
        let notified = connections
            .iter()
            .filter(|conn| conn.try_send(OutboundFrame::Close).is_ok())
            .count();

        if !connections.is_empty() {
            tracing::info!(notified = notified, total = connections.len(), "Close frames queued");
        }

        notified
    }

    /// Wait up to the drain timeout for the registry to empty
    async fn wait_for_connections_to_close(&self) -> (usize, usize) {
        let registry = self.hub.registry();
        let initial = registry.connection_count();
        if initial == 0 {
            return (0, 0);
        }

        let wait_future = async {
            while registry.connection_count() > 0 {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        };

        let _ = timeout(self.drain_timeout, wait_future).await;

        let remaining = registry.connection_count();
        if remaining > 0 {
            tracing::warn!(
                remaining_connections = remaining,
                "Some connections did not close gracefully"
            );
        }

        (initial.saturating_sub(remaining), remaining)
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Connections that accepted a close frame
    pub clients_notified: usize,
    /// Connections that released themselves before the timeout
    pub connections_closed: usize,
    /// Connections still registered when the timeout elapsed
    pub connections_remaining: usize,
    /// Total time taken for shutdown
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HubConfig, RateLimitConfig};
    use crate::hub::CloseReason;

    fn test_hub() -> Arc<CollabHub> {
        Arc::new(CollabHub::new(HubConfig::default(), RateLimitConfig::default()))
    }

    fn settings(drain_timeout_secs: u64) -> ShutdownSettings {
        ShutdownSettings { drain_timeout_secs }
    }

    #[tokio::test]
    async fn test_shutdown_no_connections() {
        let (tx, _) = broadcast::channel(1);
        let shutdown = GracefulShutdown::new(test_hub(), tx, &settings(1));

        let result = shutdown.execute().await;
        assert_eq!(result.clients_notified, 0);
        assert_eq!(result.connections_closed, 0);
        assert_eq!(result.connections_remaining, 0);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_sessions_to_release() {
        let hub = test_hub();
        let (tx, mut shutdown_rx) = broadcast::channel(1);

        let (conn_tx, mut conn_rx) = hub.channel();
        let session = hub.join_document(4, conn_tx);

        // Stand-in for a writer task: release the session once Close arrives
        tokio::spawn(async move {
            while let Some(frame) = conn_rx.recv().await {
                if frame == OutboundFrame::Close {
                    session.close(&CloseReason::PeerClosed);
                    break;
                }
            }
        });

        let shutdown = GracefulShutdown::new(hub.clone(), tx, &settings(5));
        let result = shutdown.execute().await;

        assert_eq!(result.clients_notified, 1);
        assert_eq!(result.connections_closed, 1);
        assert_eq!(result.connections_remaining, 0);
        assert!(shutdown_rx.try_recv().is_ok());
        assert_eq!(hub.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_reports_stuck_connections() {
        let hub = test_hub();
        let (tx, _) = broadcast::channel(1);
        let (conn_tx, _conn_rx) = hub.channel();
        let _session = hub.join_document(4, conn_tx);

        let shutdown = GracefulShutdown::new(hub, tx, &settings(0));
        let result = shutdown.execute().await;

        assert_eq!(result.clients_notified, 1);
        assert_eq!(result.connections_remaining, 1);
    }
}
