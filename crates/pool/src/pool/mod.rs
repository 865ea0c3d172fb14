//! Worker pool and its public facade.
//!
//! Split into focused submodules:
//! - `core`: ThreadPool struct, construction, and read-only accessors
//! - `submission`: task submission, the execution wrapper, and cancellation
//! - `worker`: worker threads, the worker loop, and cooperative retirement
//! - `lifecycle`: resize, drain waits, graceful and forced shutdown

mod core;
mod lifecycle;
mod submission;
mod worker;

pub use self::core::ThreadPool;
