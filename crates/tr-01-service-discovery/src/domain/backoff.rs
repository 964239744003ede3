//! Exponential backoff schedule.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::time::Duration;

/// Default growth factor between retries.
pub const DEFAULT_FACTOR: f64 = 1.1;

/// Default total retry budget.
pub const DEFAULT_MAX_RETRY_TIME: Duration = Duration::from_secs(60);

/// Default first retry delay.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);

/// Retry spacing for SRV lookups.
///
/// The delay before retry `n` (zero-based) is `initial_delay * factor^n`.
/// Retries stop once `max_retry_time` has elapsed since the first attempt.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Multiplier applied to the delay after each failed attempt.
    pub factor: f64,

    /// Total time budget for one resolution.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_retry_time: Duration,

    /// Delay before the first retry.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_initial_delay")]
    pub initial_delay: Duration,
}

fn default_initial_delay() -> Duration {
    DEFAULT_INITIAL_DELAY
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            factor: DEFAULT_FACTOR,
            max_retry_time: DEFAULT_MAX_RETRY_TIME,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }
}

impl BackoffConfig {
    /// Backoff with the default initial delay.
    pub fn new(factor: f64, max_retry_time: Duration) -> Self {
        Self {
            factor,
            max_retry_time,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }

    /// Override the first retry delay.
    #[must_use]
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Delay before retry `retry` (zero-based), capped at `max_retry_time`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.factor.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map_or(self.max_retry_time, |delay| delay.min(self.max_retry_time))
    }

    /// Whether the factor can produce a non-shrinking schedule.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.factor.is_finite() && self.factor >= 1.0
    }
}
