use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Decides how long to wait before retrying a failed delivery.
pub trait RetryStrategy: Send + Sync + fmt::Debug {
    /// Delay after a failure, given the number of failures recorded before it.
    fn delay(&self, failed_attempts: u32) -> Duration;

    fn next_attempt_at(&self, failed_attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        match chrono::Duration::from_std(self.delay(failed_attempts)) {
            Ok(delay) => now
                .checked_add_signed(delay)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            Err(_) => DateTime::<Utc>::MAX_UTC,
        }
    }
}

/// Same delay after every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantRetry {
    interval: Duration,
}

impl ConstantRetry {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for ConstantRetry {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl RetryStrategy for ConstantRetry {
    fn delay(&self, _failed_attempts: u32) -> Duration {
        self.interval
    }
}

/// `initial_delay * multiplier ^ failed_attempts`, optionally capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoffRetry {
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Option<Duration>,
}

impl ExponentialBackoffRetry {
    pub fn new(initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            multiplier,
            max_delay: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }
}

impl RetryStrategy for ExponentialBackoffRetry {
    fn delay(&self, failed_attempts: u32) -> Duration {
        let ceiling = self.max_delay.unwrap_or(Duration::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powf(failed_attempts as f64);

        let delay = if secs.is_nan() || secs <= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        };
        delay.min(ceiling)
    }
}
