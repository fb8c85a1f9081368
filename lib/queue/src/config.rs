//! Queue configuration.

use crate::job::BackoffPolicy;
use serde::Deserialize;
use std::time::Duration;

/// Settings for attempts, backoff and worker polling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    /// Attempts granted to a newly enqueued job.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential backoff between automatic retries.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// How often idle workers look for due delayed jobs.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl QueueConfig {
    /// Returns the backoff policy for new jobs.
    #[must_use]
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::exponential(self.backoff_base_ms)
    }

    /// Returns the idle poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_config_has_correct_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff_base_ms, 1_000);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }
}
