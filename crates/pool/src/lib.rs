//! In-process priority thread pool.
//!
//! Tasks are closures submitted at one of four priorities. They wait in a
//! shared priority queue and run on a resizable set of persistent worker
//! threads. Every task is tracked by a [`TaskRecord`] from submission until
//! purged, and its outcome is delivered only through the [`TaskHandle`]
//! returned at submission: a failing or panicking task never takes a worker
//! down with it.
//!
//! ```no_run
//! use taskyard_pool::{Priority, ThreadPool};
//!
//! let pool = ThreadPool::with_threads(4)?;
//! let handle = pool.submit_with_priority(Priority::High, || Ok::<_, String>(21 * 2))?;
//! assert_eq!(handle.join(), Ok(42));
//! pool.shutdown();
//! # Ok::<(), taskyard_pool::PoolError>(())
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod pool;
pub mod queue;
pub mod stats;
pub mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PoolConfig;
pub use error::{ConfigError, PoolError, TaskError};
pub use pool::ThreadPool;
pub use queue::{QueueEntry, TaskQueue};
pub use stats::{PoolStats, TaskStats};
pub use task::{
    PoolState, Priority, ShutdownMode, TaskHandle, TaskId, TaskInfo, TaskRecord, TaskStatus,
};
