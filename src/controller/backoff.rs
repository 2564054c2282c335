//! # Fibonacci Backoff
//!
//! Progressive retry delays for failed syncs: 1, 1, 2, 3, 5, 8, ... times the
//! minimum, capped at the maximum.

use std::time::Duration;

/// Fibonacci backoff state for one worker
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    max_secs: u64,
    previous: u64,
    current: u64,
}

impl FibonacciBackoff {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        let min_secs = min_secs.max(1);
        Self {
            min_secs,
            max_secs: max_secs.max(min_secs),
            previous: 0,
            current: min_secs,
        }
    }

    /// Delay for the next retry, advancing the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let delay = self.current.min(self.max_secs);
        let next = self.previous.saturating_add(self.current);
        self.previous = self.current;
        self.current = next;
        Duration::from_secs(delay)
    }

    /// Start over from the minimum after a successful sync
    pub fn reset(&mut self) {
        self.previous = 0;
        self.current = self.min_secs;
    }
}
