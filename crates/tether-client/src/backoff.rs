//! Exponential backoff between reconnect attempts.

use std::time::Duration;

use crate::error::{ClientError, ClientResult};

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(250);

/// Default upper bound on any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Retry schedule for [`crate::ResilientClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Reconnect attempts allowed per call before giving up.
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 2.0,
            max_retries: 3,
        }
    }
}

impl BackoffPolicy {
    /// A policy with no delay at all, for tests and local transports.
    pub fn immediate(max_retries: u32) -> Self {
        Self { initial_delay: Duration::ZERO, max_delay: Duration::ZERO, multiplier: 1.0, max_retries }
    }

    /// Delay before retry number `retry` (1-based): `initial × multiplier^(retry-1)`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Check the policy is usable.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the multiplier is below 1 or the cap
    /// is smaller than the initial delay.
    pub fn validate(&self) -> ClientResult<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ClientError::Config("backoff multiplier must be at least 1.0".to_string()));
        }
        if self.max_delay < self.initial_delay {
            return Err(ClientError::Config(
                "backoff max_delay must not be smaller than initial_delay".to_string(),
            ));
        }
        Ok(())
    }
}
