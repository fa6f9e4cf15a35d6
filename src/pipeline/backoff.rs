//! Exponential backoff schedule shared by quote polling and purchase retries.

use std::time::Duration;

/// Delay sequence `min(base * 2^(n-1), cap)` for n = 1, 2, ...
///
/// The iterator never ends; bound it with `take` where a ceiling is needed. It
/// plugs directly into `tokio_retry` strategies.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl BackoffSchedule {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap, attempt: 0 }
    }

    pub fn from_millis(base_ms: u64, cap_ms: u64) -> Self {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(cap_ms))
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map(|delay| delay.min(self.cap))
            .unwrap_or(self.cap)
    }
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.attempt = self.attempt.saturating_add(1);
        Some(self.delay_for(self.attempt))
    }
}
