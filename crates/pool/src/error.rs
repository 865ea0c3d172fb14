use thiserror::Error;

use crate::task::TaskId;

/// Errors returned synchronously by pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool is shutting down or stopped")]
    PoolClosed,

    #[error("invalid pool size: {0} (must be at least 1)")]
    InvalidResize(usize),

    #[error("task id {0} is already tracked by this pool")]
    DuplicateTaskId(TaskId),

    #[error("task id space exhausted")]
    TaskIdsExhausted,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Outcome of a task that did not produce a value.
///
/// Delivered only through the task's [`TaskHandle`](crate::TaskHandle) and
/// mirrored as a message on its record; never raised into a worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task cancelled before it started")]
    Cancelled,
}

/// Errors raised while loading or validating a [`PoolConfig`](crate::PoolConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
