use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connection_manager::{OutboundFrame, SendFailure};
use crate::hub::CollabHub;
use crate::metrics::HeartbeatMetrics;

/// Background task that keeps idle sockets alive with server pings
pub struct HeartbeatTask {
    config: WebSocketConfig,
    hub: Arc<CollabHub>,
    shutdown: broadcast::Receiver<()>,
}

/// Outcome of one heartbeat round
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatRound {
    pub sent: usize,
    pub full: usize,
    pub closed: usize,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        hub: Arc<CollabHub>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            hub,
            shutdown,
        }
    }

    /// Run until the shutdown signal fires
    pub async fn run(mut self) {
        if self.config.heartbeat_interval == 0 {
            tracing::info!("Heartbeat disabled");
            return;
        }

        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval);
        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats();
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Queue a ping to every registered connection without waiting on any of them
    fn send_heartbeats(&self) -> HeartbeatRound {
        let connections = self.hub.registry().get_all_connections();
        if connections.is_empty() {
            return HeartbeatRound::default();
        }

        let start = Instant::now();
        let mut round = HeartbeatRound::default();

        for handle in &connections {
            match handle.try_send(OutboundFrame::Ping) {
                Ok(()) => round.sent += 1,
                Err(SendFailure::Full) => round.full += 1,
                Err(SendFailure::Closed) => {
                    round.closed += 1;
                    tracing::debug!(
                        connection_id = %handle.id,
                        "Failed to queue heartbeat, connection may be dead"
                    );
                }
            }
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        HeartbeatMetrics::record_duration_ms(elapsed_ms);
        let failed = round.full + round.closed;
        if failed > 0 {
            HeartbeatMetrics::record_failed(failed as u64);
        }

        tracing::debug!(
            total = connections.len(),
            sent = round.sent,
            full = round.full,
            closed = round.closed,
            elapsed_ms = elapsed_ms,
            "Heartbeat round completed"
        );

        round
    }
}
