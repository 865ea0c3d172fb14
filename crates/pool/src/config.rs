use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Pool configuration, typically parsed from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool name, attached to every worker span.
    #[serde(default = "default_name")]
    pub name: String,
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Worker threads are named `{prefix}-{index}`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    /// How often an idle worker wakes to re-check the resize target.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    /// Worker stack size in KiB. `None` keeps the platform default.
    #[serde(default)]
    pub stack_size_kb: Option<usize>,
}

fn default_name() -> String { "taskyard".to_string() }
fn default_worker_threads() -> usize { 0 }
fn default_thread_name_prefix() -> String { "taskyard-worker".to_string() }
fn default_idle_poll_ms() -> u64 { 100 }

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            worker_threads: default_worker_threads(),
            thread_name_prefix: default_thread_name_prefix(),
            idle_poll_ms: default_idle_poll_ms(),
            stack_size_kb: None,
        }
    }
}

impl PoolConfig {
    /// Config with an explicit worker count and defaults elsewhere.
    pub fn with_threads(worker_threads: usize) -> Self {
        Self {
            worker_threads,
            ..Self::default()
        }
    }

    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Build config from defaults plus `TASKYARD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable numbers are ignored.
    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("TASKYARD_NAME") {
            self.name = v;
        }
        if let Some(v) = lookup("TASKYARD_WORKER_THREADS") {
            if let Ok(n) = v.parse::<usize>() {
                self.worker_threads = n;
            }
        }
        if let Some(v) = lookup("TASKYARD_THREAD_NAME_PREFIX") {
            self.thread_name_prefix = v;
        }
        if let Some(v) = lookup("TASKYARD_IDLE_POLL_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                self.idle_poll_ms = ms;
            }
        }
    }

    /// Reject settings the pool cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_name_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        if self.idle_poll_ms == 0 {
            return Err(ConfigError::Invalid(
                "idle_poll_ms must be greater than zero".to_string(),
            ));
        }
        if self.stack_size_kb == Some(0) {
            return Err(ConfigError::Invalid(
                "stack_size_kb must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.name, "taskyard");
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.thread_name_prefix, "taskyard-worker");
        assert_eq!(config.idle_poll_ms, 100);
        assert_eq!(config.stack_size_kb, None);
    }

    #[test]
    fn resolved_worker_threads() {
        let mut config = PoolConfig::default();
        // 0 means auto-detect
        assert!(config.resolved_worker_threads() > 0);

        config.worker_threads = 8;
        assert_eq!(config.resolved_worker_threads(), 8);
    }

    #[test]
    fn parse_partial_toml_fills_defaults() {
        let config: PoolConfig = toml::from_str(
            r#"
            name = "ingest"
            worker_threads = 6
            "#,
        )
        .unwrap();
        assert_eq!(config.name, "ingest");
        assert_eq!(config.worker_threads, 6);
        assert_eq!(config.idle_poll_ms, 100);
        assert_eq!(config.thread_name_prefix, "taskyard-worker");
    }

    #[test]
    fn parse_rejects_wrong_types() {
        let err = PoolConfig::from_toml("worker_threads = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn overrides_replace_values_and_skip_garbage() {
        let env: HashMap<&str, &str> = [
            ("TASKYARD_NAME", "batch"),
            ("TASKYARD_WORKER_THREADS", "3"),
            ("TASKYARD_IDLE_POLL_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = PoolConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.name, "batch");
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.idle_poll_ms, 100);
    }

    #[test]
    fn validate_rejects_zero_poll_and_empty_prefix() {
        let mut config = PoolConfig::default();
        config.idle_poll_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PoolConfig::default();
        config.thread_name_prefix = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PoolConfig::default();
        config.stack_size_kb = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let err = PoolConfig::from_file("/definitely/not/here/taskyard.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
