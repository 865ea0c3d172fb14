use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::PoolError;
use crate::task::{PoolState, ShutdownMode};

use super::ThreadPool;

impl ThreadPool {
    /// Change the number of worker threads.
    ///
    /// Growing spawns workers immediately. Shrinking is cooperative: surplus
    /// workers finish their current task and exit the next time they look
    /// for work, so [`ThreadPool::size`] converges to `new_size`.
    pub fn resize(&self, new_size: usize) -> Result<(), PoolError> {
        if new_size == 0 {
            return Err(PoolError::InvalidResize(new_size));
        }

        let retired = {
            let mut workers = self.shared.workers();
            if workers.state != PoolState::Running {
                return Err(PoolError::PoolClosed);
            }

            let previous = workers.target();
            workers.set_target(new_size);
            while workers.live_count() < new_size {
                if let Err(e) = workers.spawn(&self.shared) {
                    let live = workers.live_count().max(1);
                    workers.set_target(live);
                    error!(error = %e, live, "Failed to grow thread pool");
                    return Err(e);
                }
            }

            info!(
                pool = %self.shared.config.name,
                from = previous,
                to = new_size,
                "Resizing thread pool"
            );
            workers.take_retired()
        };

        join_all(retired);
        Ok(())
    }

    /// Block until no task is pending and no worker is busy.
    pub fn wait_for_all(&self) {
        self.shared.queue.wait_idle();
    }

    /// Bounded [`ThreadPool::wait_for_all`]. Returns whether the pool went idle.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.shared.queue.wait_idle_timeout(timeout)
    }

    /// Stop accepting tasks, run everything already queued, join workers.
    ///
    /// Returns immediately if a shutdown has already begun.
    pub fn shutdown(&self) {
        let handles = {
            let mut workers = self.shared.workers();
            if workers.state != PoolState::Running {
                return;
            }
            workers.state = PoolState::ShuttingDown(ShutdownMode::Graceful);
            self.shared.queue.stop();
            workers.take_all()
        };

        info!(
            pool = %self.shared.config.name,
            pending = self.pending_tasks(),
            "Shutting down thread pool"
        );
        join_all(handles);
        self.shared.workers().state = PoolState::Stopped;
        info!(pool = %self.shared.config.name, "Thread pool stopped");
    }

    /// Stop accepting tasks, discard the queue, let running tasks finish.
    ///
    /// Discarded tasks are marked cancelled and their handles resolve to
    /// [`TaskError::Cancelled`](crate::TaskError::Cancelled). May escalate a
    /// graceful shutdown already in progress.
    pub fn force_shutdown(&self) {
        let (handles, owns_stop, discarded) = {
            let mut workers = self.shared.workers();
            let owns_stop = match workers.state {
                PoolState::Running => true,
                PoolState::ShuttingDown(ShutdownMode::Graceful) => false,
                PoolState::ShuttingDown(ShutdownMode::Forced) | PoolState::Stopped => return,
            };
            workers.state = PoolState::ShuttingDown(ShutdownMode::Forced);
            self.shared.queue.stop();
            // Cleared before the state change is observable, so no worker
            // claims a discarded task after a caller sees `Forced`.
            let discarded = self.shared.queue.clear();
            (workers.take_all(), owns_stop, discarded)
        };

        let count = discarded.len();
        if count > 0 {
            if let Ok(mut stats) = self.shared.stats.write() {
                stats.record_cancelled(count);
            }
        }
        drop(discarded);
        warn!(
            pool = %self.shared.config.name,
            discarded = count,
            "Forced shutdown discarded pending tasks"
        );

        join_all(handles);
        if owns_stop {
            self.shared.workers().state = PoolState::Stopped;
            info!(pool = %self.shared.config.name, "Thread pool stopped");
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if self.state() == PoolState::Running {
            self.shutdown();
        }
    }
}

/// Join worker threads, skipping the calling thread.
///
/// The caller may itself be a worker, e.g. when a task drops the last
/// reference to its own pool.
pub(super) fn join_all(handles: Vec<JoinHandle<()>>) {
    let current = thread::current().id();
    for handle in handles {
        if handle.thread().id() == current {
            continue;
        }
        if handle.join().is_err() {
            error!("Worker thread panicked");
        }
    }
}
