//! Bounded timestamp history backing the message limiter

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Ring buffer of the most recent message timestamps for one connection.
///
/// The history never holds more than `capacity` entries; recording a new
/// timestamp on a full history evicts the oldest one.
#[derive(Debug)]
pub struct SlidingWindow {
    timestamps: VecDeque<Instant>,
    capacity: usize,
    window: Duration,
}

impl SlidingWindow {
    pub fn new(capacity: usize, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            timestamps: VecDeque::with_capacity(capacity),
            capacity,
            window,
        }
    }

    /// Record a message sent at `now`.
    ///
    /// Returns `true` when the message exceeds the limit: `capacity`
    /// messages were already recorded and the oldest of them is less than
    /// one window old. The timestamp is recorded either way.
    pub fn record(&mut self, now: Instant) -> bool {
        let exceeded = self.is_full()
            && self
                .timestamps
                .front()
                .is_some_and(|oldest| now.saturating_duration_since(*oldest) < self.window);

        if self.is_full() {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(now);

        exceeded
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.timestamps.len() >= self.capacity
    }
}
