use crate::config::PollingConfig;
use crate::error::ApiError;
use std::time::Duration;

/// Bounded retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    /// Network failures are not retried unless this is set
    pub retry_network: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
            retry_network: false,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether the error belongs to a transient class worth another attempt
    pub fn should_retry(&self, err: &ApiError) -> bool {
        match err {
            ApiError::Timeout => true,
            ApiError::Network(_) => self.retry_network,
            ApiError::Http { status, .. } => *status >= 500 || *status == 429,
            ApiError::Unauthorized { .. }
            | ApiError::Deserialization(_)
            | ApiError::Validation(_) => false,
        }
    }
}

/// Per-query scheduling options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub enabled: bool,
    /// `None` fetches once per enable instead of polling
    pub refetch_interval: Option<Duration>,
    pub retry: RetryPolicy,
    /// How long an unobserved entry stays cached
    pub gc_grace: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            refetch_interval: None,
            retry: RetryPolicy::default(),
            gc_grace: Duration::from_secs(300),
        }
    }
}

impl QueryOptions {
    pub fn polling(every: Duration) -> Self {
        Self {
            refetch_interval: Some(every),
            ..Self::default()
        }
    }

    /// Options derived from the polling section of the config
    pub fn from_config(config: &PollingConfig, refetch_interval: Option<Duration>) -> Self {
        Self {
            enabled: true,
            refetch_interval,
            retry: RetryPolicy {
                max_retries: config.retry_attempts,
                delay: Duration::from_millis(config.retry_delay_ms),
                retry_network: config.retry_network_errors,
            },
            gc_grace: Duration::from_secs(config.gc_grace_secs),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_gc_grace(mut self, gc_grace: Duration) -> Self {
        self.gc_grace = gc_grace;
        self
    }
}
