//! Runner configuration.

use serde::Deserialize;
use std::time::Duration;

/// Settings for node execution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunnerConfig {
    /// Upper bound on a single AI capability call, in milliseconds.
    #[serde(default = "default_ai_timeout_ms")]
    pub ai_timeout_ms: u64,

    /// Sleep used by `delay` nodes that do not set `delayMs`.
    #[serde(default = "default_delay_ms")]
    pub default_delay_ms: u64,
}

fn default_ai_timeout_ms() -> u64 {
    60_000
}

fn default_delay_ms() -> u64 {
    1_000
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            ai_timeout_ms: default_ai_timeout_ms(),
            default_delay_ms: default_delay_ms(),
        }
    }
}

impl RunnerConfig {
    /// Returns the AI call timeout.
    #[must_use]
    pub fn ai_timeout(&self) -> Duration {
        Duration::from_millis(self.ai_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_config_has_correct_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.ai_timeout_ms, 60_000);
        assert_eq!(config.default_delay_ms, 1_000);
        assert_eq!(config.ai_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: RunnerConfig =
            serde_json::from_str(r#"{"ai_timeout_ms": 5}"#).expect("deserialize");
        assert_eq!(config.ai_timeout_ms, 5);
        assert_eq!(config.default_delay_ms, 1_000);
    }
}
