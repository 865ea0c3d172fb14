use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::queue::TaskQueue;
use crate::stats::{PoolStats, TaskStats};
use crate::task::{PoolState, TaskId, TaskInfo, TaskRecord};

use super::worker::WorkerSet;

/// A pool of persistent worker threads executing prioritized tasks.
///
/// Tasks are submitted with [`ThreadPool::submit`] and friends, wait in a
/// shared priority queue, and run on the first worker that claims them.
/// Dropping the pool performs a graceful shutdown.
pub struct ThreadPool {
    pub(super) shared: Arc<Shared>,
}

/// State shared between the facade and every worker thread.
pub(super) struct Shared {
    pub(super) config: PoolConfig,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) queue: TaskQueue,
    /// Tracking map: every task from submission until purged.
    pub(super) tasks: RwLock<HashMap<TaskId, Arc<TaskRecord>>>,
    pub(super) next_id: AtomicU64,
    /// Lifecycle counters, under a lock separate from the queue.
    pub(super) stats: Arc<RwLock<TaskStats>>,
    /// Worker handles, resize target and pool state.
    pub(super) workers: Mutex<WorkerSet>,
    pub(super) started_at: Instant,
}

impl Shared {
    pub(super) fn tasks_read(&self) -> RwLockReadGuard<'_, HashMap<TaskId, Arc<TaskRecord>>> {
        self.tasks.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(super) fn tasks_write(&self) -> RwLockWriteGuard<'_, HashMap<TaskId, Arc<TaskRecord>>> {
        self.tasks.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(super) fn workers(&self) -> MutexGuard<'_, WorkerSet> {
        self.workers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ThreadPool {
    /// Create a pool and start its workers.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a pool with `threads` workers and default settings otherwise.
    pub fn with_threads(threads: usize) -> Result<Self, PoolError> {
        if threads == 0 {
            return Err(PoolError::InvalidResize(threads));
        }
        Self::new(PoolConfig::with_threads(threads))
    }

    /// Create a pool that reads time from `clock`.
    pub fn with_clock(config: PoolConfig, clock: Arc<dyn Clock>) -> Result<Self, PoolError> {
        config.validate()?;
        let threads = config.resolved_worker_threads();
        let shared = Arc::new(Shared {
            queue: TaskQueue::new(Arc::clone(&clock)),
            clock,
            tasks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stats: Arc::new(RwLock::new(TaskStats::default())),
            workers: Mutex::new(WorkerSet::new(threads)),
            started_at: Instant::now(),
            config,
        });

        {
            let mut workers = shared.workers();
            for _ in 0..threads {
                if let Err(e) = workers.spawn(&shared) {
                    drop(workers);
                    shared.queue.stop();
                    let handles = shared.workers().take_all();
                    super::lifecycle::join_all(handles);
                    return Err(e);
                }
            }
        }

        info!(
            pool = %shared.config.name,
            threads,
            "Thread pool started"
        );
        Ok(Self { shared })
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Number of live worker threads.
    pub fn size(&self) -> usize {
        self.shared.workers().live_count()
    }

    /// Workers currently executing a task.
    pub fn active_threads(&self) -> usize {
        self.shared.queue.in_flight()
    }

    /// Tasks queued and not yet claimed by a worker.
    pub fn pending_tasks(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn state(&self) -> PoolState {
        self.shared.workers().state
    }

    /// Whether a graceful or forced shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.state() != PoolState::Running
    }

    /// Snapshot of pool counters.
    pub fn stats(&self) -> PoolStats {
        let thread_count = self.size();
        let active_threads = self.active_threads();
        let pending_tasks = self.pending_tasks();
        let stats = self
            .shared
            .stats
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        PoolStats {
            thread_count,
            active_threads,
            pending_tasks,
            submitted_tasks: stats.submitted,
            completed_tasks: stats.completed,
            failed_tasks: stats.failed,
            cancelled_tasks: stats.cancelled,
            executed_by_priority: stats.executed_by_priority,
            avg_task_duration: stats.avg_duration,
            max_task_duration: stats.max_duration,
            last_finished: stats.last_finished,
            uptime: self.shared.started_at.elapsed(),
        }
    }

    /// Snapshot of every tracked task, ordered by id.
    pub fn task_infos(&self) -> Vec<TaskInfo> {
        let records: Vec<Arc<TaskRecord>> = self.shared.tasks_read().values().cloned().collect();
        let mut infos: Vec<TaskInfo> = records.iter().map(|r| r.info()).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub fn task_info(&self, id: TaskId) -> Option<TaskInfo> {
        let record = self.shared.tasks_read().get(&id).cloned();
        record.map(|r| r.info())
    }

    /// Drop finished records from the tracking map. Returns how many went.
    pub fn purge_finished(&self) -> usize {
        let mut tasks = self.shared.tasks_write();
        let before = tasks.len();
        tasks.retain(|_, record| !record.status().is_terminal());
        before - tasks.len()
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.shared.config.name)
            .field("size", &self.size())
            .field("pending", &self.pending_tasks())
            .field("state", &self.state())
            .finish()
    }
}
