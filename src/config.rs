use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::{ConstantRetry, ExponentialBackoffRetry, RetryStrategy};

/// Runtime options for a [`Salus`](crate::Salus) instance.
#[derive(Debug, Clone)]
pub struct SalusOptions {
    retry_strategy: Arc<dyn RetryStrategy>,
    queue_interval: Duration,
    purge_interval: Duration,
    retention: Option<Duration>,
    error_after_retries: Option<u32>,
    error_after_elapsed: Option<Duration>,
    schema_version: String,
    do_not_fire_and_forget: bool,
}

impl Default for SalusOptions {
    fn default() -> Self {
        Self {
            retry_strategy: Arc::new(ConstantRetry::default()),
            queue_interval: Duration::from_millis(500),
            purge_interval: Duration::from_secs(60),
            retention: None,
            error_after_retries: None,
            error_after_elapsed: None,
            schema_version: env!("CARGO_PKG_VERSION").to_string(),
            do_not_fire_and_forget: false,
        }
    }
}

impl SalusOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_strategy(mut self, strategy: impl RetryStrategy + 'static) -> Self {
        self.retry_strategy = Arc::new(strategy);
        self
    }

    /// How often the queue processor wakes up.
    pub fn with_queue_interval(mut self, interval: Duration) -> Self {
        self.queue_interval = interval;
        self
    }

    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }

    /// Keep completed outbox records at least this long. Without a
    /// retention window nothing is ever purged.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Log delivery failures as errors once a record has failed this many times.
    pub fn with_error_after_retries(mut self, retries: u32) -> Self {
        self.error_after_retries = Some(retries);
        self
    }

    /// Log delivery failures as errors once a record has been pending this long.
    pub fn with_error_after_elapsed(mut self, elapsed: Duration) -> Self {
        self.error_after_elapsed = Some(elapsed);
        self
    }

    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    /// Wait for the immediate send to finish before a save returns.
    pub fn with_do_not_fire_and_forget(mut self, wait: bool) -> Self {
        self.do_not_fire_and_forget = wait;
        self
    }

    pub fn retry_strategy(&self) -> &dyn RetryStrategy {
        self.retry_strategy.as_ref()
    }

    pub fn queue_interval(&self) -> Duration {
        self.queue_interval
    }

    pub fn purge_interval(&self) -> Duration {
        self.purge_interval
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention
    }

    pub fn error_after_retries(&self) -> Option<u32> {
        self.error_after_retries
    }

    pub fn error_after_elapsed(&self) -> Option<Duration> {
        self.error_after_elapsed
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn do_not_fire_and_forget(&self) -> bool {
        self.do_not_fire_and_forget
    }
}

/// Serializable form of [`SalusOptions`], for loading from a config file.
///
/// ```
/// let config = salus::SalusConfig::from_json(
///     r#"{ "retry": { "kind": "exponential", "initial_delay_ms": 250, "multiplier": 2.0 },
///          "retention_secs": 3600 }"#,
/// )
/// .unwrap();
/// assert_eq!(config.queue_interval_ms, 500);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SalusConfig {
    pub retry: RetryConfig,
    pub queue_interval_ms: u64,
    pub purge_interval_ms: u64,
    pub retention_secs: Option<u64>,
    pub error_after_retries: Option<u32>,
    pub error_after_secs: Option<u64>,
    pub schema_version: Option<String>,
    pub do_not_fire_and_forget: bool,
}

impl Default for SalusConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            queue_interval_ms: 500,
            purge_interval_ms: 60_000,
            retention_secs: None,
            error_after_retries: None,
            error_after_secs: None,
            schema_version: None,
            do_not_fire_and_forget: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryConfig {
    Constant {
        interval_ms: u64,
    },
    Exponential {
        initial_delay_ms: u64,
        multiplier: f64,
        #[serde(default)]
        max_delay_ms: Option<u64>,
    },
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::Constant { interval_ms: 500 }
    }
}

impl SalusConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn into_options(self) -> SalusOptions {
        let mut options = SalusOptions::new()
            .with_queue_interval(Duration::from_millis(self.queue_interval_ms))
            .with_purge_interval(Duration::from_millis(self.purge_interval_ms))
            .with_do_not_fire_and_forget(self.do_not_fire_and_forget);

        options = match self.retry {
            RetryConfig::Constant { interval_ms } => {
                options.with_retry_strategy(ConstantRetry::new(Duration::from_millis(interval_ms)))
            }
            RetryConfig::Exponential {
                initial_delay_ms,
                multiplier,
                max_delay_ms,
            } => {
                let mut retry =
                    ExponentialBackoffRetry::new(Duration::from_millis(initial_delay_ms), multiplier);
                if let Some(max) = max_delay_ms {
                    retry = retry.with_max_delay(Duration::from_millis(max));
                }
                options.with_retry_strategy(retry)
            }
        };

        if let Some(secs) = self.retention_secs {
            options = options.with_retention(Duration::from_secs(secs));
        }
        if let Some(retries) = self.error_after_retries {
            options = options.with_error_after_retries(retries);
        }
        if let Some(secs) = self.error_after_secs {
            options = options.with_error_after_elapsed(Duration::from_secs(secs));
        }
        if let Some(version) = self.schema_version {
            options = options.with_schema_version(version);
        }
        options
    }
}
