//! # Fibonacci Backoff
//!
//! Delays between re-list attempts after list/watch failures.
//! Grows more slowly than exponential backoff, so a flapping API server is
//! retried promptly without being hammered.
//!
//! Sequence with the defaults: 1s, 1s, 2s, 3s, 5s, 8s, 13s, 21s, 30s (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, capped at the maximum.
/// Tracks consecutive failures so the caller can give up after a limit.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Minimum delay in seconds (for reset)
    min_seconds: u64,
    /// Previous delay in seconds
    prev_seconds: u64,
    /// Current delay in seconds
    current_seconds: u64,
    /// Maximum delay in seconds
    max_seconds: u64,
    /// Failures since the last reset
    failures: u32,
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(1, 30)
    }
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with the given bounds in seconds
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            min_seconds,
            prev_seconds: 0,
            current_seconds: min_seconds,
            max_seconds,
            failures: 0,
        }
    }

    /// Records a failure and returns how long to wait before the next attempt
    pub fn next_backoff(&mut self) -> Duration {
        let result = Duration::from_secs(self.current_seconds);

        let next_seconds = self.prev_seconds + self.current_seconds;
        self.prev_seconds = self.current_seconds;
        self.current_seconds = std::cmp::min(next_seconds, self.max_seconds);
        self.failures = self.failures.saturating_add(1);

        result
    }

    /// Consecutive failures recorded since the last reset
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Reset after a successful attempt
    pub fn reset(&mut self) {
        self.prev_seconds = 0;
        self.current_seconds = self.min_seconds;
        self.failures = 0;
    }
}
