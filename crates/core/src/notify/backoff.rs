//! Capped retry delays.

use std::time::Duration;

/// How the delay grows with consecutive failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// `base * 2^(n-1)`, for transient setup failures.
    Exponential,
    /// `base * n`, for re-subscription after repeated delivery failures.
    Proportional,
}

/// Tracks consecutive failures and yields the delay before the next attempt.
pub struct Backoff {
    base: Duration,
    cap: Duration,
    strategy: BackoffStrategy,
    consecutive_failures: u32,
}

impl Backoff {
    pub fn exponential(base: Duration, cap: Duration) -> Self {
        Self::new(base, cap, BackoffStrategy::Exponential)
    }

    pub fn proportional(base: Duration, cap: Duration) -> Self {
        Self::new(base, cap, BackoffStrategy::Proportional)
    }

    pub fn new(base: Duration, cap: Duration, strategy: BackoffStrategy) -> Self {
        Self {
            base,
            cap,
            strategy,
            consecutive_failures: 0,
        }
    }

    /// Records a failure and returns the capped delay before retrying.
    pub fn next_delay(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let factor = match self.strategy {
            BackoffStrategy::Exponential => {
                1u32.checked_shl(self.consecutive_failures - 1).unwrap_or(u32::MAX)
            }
            BackoffStrategy::Proportional => self.consecutive_failures,
        };
        self.base
            .checked_mul(factor)
            .map(|delay| delay.min(self.cap))
            .unwrap_or(self.cap)
    }

    /// Clears the failure streak after a successful attempt.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
