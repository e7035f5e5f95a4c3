//! Rate limiting configuration

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the per-connection message limiter
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Number of messages a connection may send within one window
    #[serde(default = "default_burst_size")]
    pub burst_size: usize,
    /// Length of the sliding window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_burst_size() -> usize {
    10
}

fn default_window_ms() -> u64 {
    1000 // 1 second
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            burst_size: default_burst_size(),
            window_ms: default_window_ms(),
        }
    }
}
