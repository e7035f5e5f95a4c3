//! Per-connection message rate limiting using a sliding window.
//!
//! Each connection keeps the timestamps of its last `burst_size` messages.
//! A message is rejected when the history is already full and the oldest
//! retained timestamp is younger than the configured window, i.e. the
//! connection tried to send more than `burst_size` messages within one
//! window. Connections sending slower than that never trip the limiter.

mod config;
mod limiter;
mod sliding_window;

pub use config::RateLimitConfig;
pub use limiter::{MessageRateLimiter, RateLimitDecision};
pub use sliding_window::SlidingWindow;
