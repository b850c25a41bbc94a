//! Bounded exponential backoff for transient shop failures

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Wait before `attempt` (1-based). The first attempt runs immediately.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(i32::MAX as u32) as i32;
        let base_ms = self.base_delay.as_millis() as f64;
        let delay_ms = (base_ms * self.multiplier.powi(exponent))
            .min(self.max_delay.as_millis() as f64)
            .max(0.0);
        Duration::from_millis(delay_ms as u64)
    }

    pub const fn has_attempts_left(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Transport and auth failures are retried; everything else fails the
    /// job on the spot.
    pub const fn is_retryable(error: &Error) -> bool {
        matches!(error, Error::Transport(_))
    }
}
