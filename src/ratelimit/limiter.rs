//! Per-connection message rate limiter

use std::time::Instant;

use dashmap::DashMap;

use super::config::RateLimitConfig;
use super::sliding_window::SlidingWindow;
use crate::connection_manager::ConnectionId;

/// Result of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Message may be relayed
    Allowed,
    /// Message must be dropped
    Exceeded,
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }
}

/// Tracks a bounded message history per connection.
///
/// Entries are created when a connection joins a document and removed
/// when it leaves, so the map only ever holds live connections.
pub struct MessageRateLimiter {
    histories: DashMap<ConnectionId, SlidingWindow>,
    config: RateLimitConfig,
}

impl MessageRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            histories: DashMap::new(),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Start (or reset) the message history for a connection
    pub fn track(&self, connection_id: ConnectionId) {
        self.histories.insert(connection_id, self.new_window());
    }

    /// Drop the message history for a connection
    pub fn forget(&self, connection_id: ConnectionId) {
        self.histories.remove(&connection_id);
    }

    /// Record a message sent now and decide whether it may be relayed
    pub fn record_and_check(&self, connection_id: ConnectionId) -> RateLimitDecision {
        self.record_and_check_at(connection_id, Instant::now())
    }

    /// Record a message sent at `now` and decide whether it may be relayed.
    ///
    /// The history is updated regardless of the outcome.
    pub fn record_and_check_at(&self, connection_id: ConnectionId, now: Instant) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::Allowed;
        }

        let exceeded = self
            .histories
            .entry(connection_id)
            .or_insert_with(|| self.new_window())
            .record(now);

        if exceeded {
            RateLimitDecision::Exceeded
        } else {
            RateLimitDecision::Allowed
        }
    }

    /// Number of connections with a live message history
    pub fn tracked_connections(&self) -> usize {
        self.histories.len()
    }

    /// Current history length for a connection, if tracked
    pub fn history_len(&self, connection_id: ConnectionId) -> Option<usize> {
        self.histories.get(&connection_id).map(|w| w.len())
    }

    fn new_window(&self) -> SlidingWindow {
        SlidingWindow::new(self.config.burst_size, self.config.window())
    }
}
