//! # Exponential Backoff
//!
//! Per-key retry delays for failed reconciliation passes.
//!
//! The delay starts at `BACKOFF_START_MS`, doubles on every consecutive failure
//! and is capped at `BACKOFF_MAX_MS`. A successful pass resets it.
//!
//! ## Usage
//!
//! ```rust
//! use workset_controller::controller::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(1000, 5000);
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(1000));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(2000));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(4000));
//! assert_eq!(backoff.next_backoff(), Duration::from_millis(5000));
//! ```

use std::time::Duration;

/// Doubling backoff calculator, in milliseconds
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// First delay, also the value restored by [`reset`](Self::reset)
    start_ms: u64,
    /// Delay returned by the next call
    current_ms: u64,
    /// Upper bound
    max_ms: u64,
}

impl ExponentialBackoff {
    /// Create a backoff starting at `start_ms` and capped at `max_ms`.
    ///
    /// A zero start is bumped to one millisecond so the sequence can grow.
    #[must_use]
    pub fn new(start_ms: u64, max_ms: u64) -> Self {
        let start_ms = start_ms.max(1);
        let max_ms = max_ms.max(start_ms);
        Self {
            start_ms,
            current_ms: start_ms,
            max_ms,
        }
    }

    /// Current delay in milliseconds, then advance the sequence
    pub fn next_backoff_ms(&mut self) -> u64 {
        let result = self.current_ms;
        self.current_ms = self.current_ms.saturating_mul(2).min(self.max_ms);
        result
    }

    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_millis(self.next_backoff_ms())
    }

    /// Back to the starting delay after a successful pass
    pub fn reset(&mut self) {
        self.current_ms = self.start_ms;
    }
}

/// Backoff bookkeeping kept per queue key
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: ExponentialBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(start_ms: u64, max_ms: u64) -> Self {
        Self {
            backoff: ExponentialBackoff::new(start_ms, max_ms),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(1000, 300_000);
        let delays: Vec<u64> = (0..10).map(|_| backoff.next_backoff_ms()).collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16_000, 32_000, 64_000, 128_000, 256_000, 300_000]
        );
        assert_eq!(backoff.next_backoff_ms(), 300_000);
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut backoff = ExponentialBackoff::new(500, 10_000);
        backoff.next_backoff_ms();
        backoff.next_backoff_ms();
        backoff.reset();
        assert_eq!(backoff.next_backoff(), Duration::from_millis(500));
    }

    #[test]
    fn test_exponential_backoff_degenerate_bounds() {
        let mut backoff = ExponentialBackoff::new(0, 0);
        assert_eq!(backoff.next_backoff_ms(), 1);
        assert_eq!(backoff.next_backoff_ms(), 1);
    }

    #[test]
    fn test_backoff_state_per_key() {
        let mut first = BackoffState::new(1000, 8000);
        let mut second = BackoffState::new(1000, 8000);

        first.increment_error();
        assert_eq!(first.backoff.next_backoff_ms(), 1000);
        first.increment_error();
        assert_eq!(first.backoff.next_backoff_ms(), 2000);

        second.increment_error();
        assert_eq!(second.backoff.next_backoff_ms(), 1000);
        assert_eq!(first.error_count, 2);
        assert_eq!(second.error_count, 1);
    }
}
