//! Centralized worker configuration.
//!
//! Loaded via the `config` crate from `NODEFLOW_`-prefixed environment
//! variables. Nested fields use `__`, e.g. `NODEFLOW_QUEUE__MAX_ATTEMPTS=5`.

use nodeflow_queue::QueueConfig;
use nodeflow_workflow::RunnerConfig;
use serde::Deserialize;
use std::time::Duration;

/// Worker daemon configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// SQLite database URL for the job store.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Number of concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Queue attempts, backoff and polling.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Node execution settings.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Removal of old finished jobs.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

fn default_database_url() -> String {
    "sqlite://nodeflow.db".to_string()
}

fn default_workers() -> usize {
    4
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            workers: default_workers(),
            queue: QueueConfig::default(),
            runner: RunnerConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

/// Periodic cleanup of completed and failed jobs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CleanupConfig {
    /// Interval between cleanup runs, in seconds.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Finished jobs older than this are removed.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_interval_secs() -> u64 {
    3_600
}

fn default_max_age_secs() -> u64 {
    86_400
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl WorkerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(environment())
    }

    fn from_source(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("NODEFLOW")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(source))
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = WorkerConfig::from_source(env(&[])).unwrap();
        assert_eq!(config.database_url, "sqlite://nodeflow.db");
        assert_eq!(config.workers, 4);
        assert_eq!(config.queue, QueueConfig::default());
        assert_eq!(config.runner, RunnerConfig::default());
        assert_eq!(config.cleanup.max_age(), Duration::from_secs(86_400));
    }

    #[test]
    fn nested_fields_override_defaults() {
        let config = WorkerConfig::from_source(env(&[
            ("NODEFLOW_WORKERS", "8"),
            ("NODEFLOW_QUEUE__MAX_ATTEMPTS", "5"),
            ("NODEFLOW_RUNNER__AI_TIMEOUT_MS", "2500"),
            ("NODEFLOW_CLEANUP__INTERVAL_SECS", "60"),
        ]))
        .unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.backoff_base_ms, 1_000);
        assert_eq!(config.runner.ai_timeout_ms, 2_500);
        assert_eq!(config.cleanup.interval(), Duration::from_secs(60));
    }

    #[test]
    fn cleanup_interval_is_never_zero() {
        let cleanup = CleanupConfig {
            interval_secs: 0,
            max_age_secs: 0,
        };
        assert_eq!(cleanup.interval(), Duration::from_secs(1));
    }
}
