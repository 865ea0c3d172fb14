use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{PoolError, TaskError};
use crate::queue::{Job, QueueEntry};
use crate::stats::TaskStats;
use crate::task::{Priority, ResultSender, TaskHandle, TaskId, TaskRecord, TaskStatus};

use super::worker::panic_message;
use super::ThreadPool;

impl ThreadPool {
    /// Submit a task at [`Priority::Normal`].
    ///
    /// Returns a handle that resolves to the closure's value, or to a
    /// [`TaskError`] if it returned `Err`, panicked, or was cancelled.
    pub fn submit<F, R, E>(&self, f: F) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce() -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: fmt::Display + 'static,
    {
        self.enqueue(None, Priority::Normal, f)
    }

    /// Submit a task at the given priority.
    pub fn submit_with_priority<F, R, E>(
        &self,
        priority: Priority,
        f: F,
    ) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce() -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: fmt::Display + 'static,
    {
        self.enqueue(None, priority, f)
    }

    /// Submit a task under a caller-chosen id.
    ///
    /// Fails with [`PoolError::DuplicateTaskId`] if `id` is still tracked.
    /// Generated ids skip past any id chosen here; choosing `u64::MAX`
    /// leaves no ids to generate afterwards.
    pub fn submit_with_id<F, R, E>(
        &self,
        id: TaskId,
        priority: Priority,
        f: F,
    ) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce() -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: fmt::Display + 'static,
    {
        self.enqueue(Some(id), priority, f)
    }

    fn enqueue<F, R, E>(
        &self,
        id: Option<TaskId>,
        priority: Priority,
        f: F,
    ) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce() -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: fmt::Display + 'static,
    {
        let shared = &self.shared;
        let mut tasks = shared.tasks_write();

        let id = match id {
            Some(id) => {
                if tasks.contains_key(&id) {
                    return Err(PoolError::DuplicateTaskId(id));
                }
                shared
                    .next_id
                    .fetch_max(id.get().saturating_add(1), Ordering::Relaxed);
                id
            }
            None => next_generated_id(&shared.next_id).ok_or(PoolError::TaskIdsExhausted)?,
        };

        let record = TaskRecord::new(id, priority, shared.clock.as_ref());
        let (handle, tx) = TaskHandle::new(Arc::clone(&record));
        let job = wrap(
            f,
            Arc::clone(&record),
            tx,
            Arc::clone(&shared.clock),
            Arc::clone(&shared.stats),
        );

        // Counted before the push so no completion is recorded ahead of it.
        if let Ok(mut stats) = shared.stats.write() {
            stats.record_submitted();
        }

        // Push while holding the tracking map: a concurrent shutdown either
        // sees this task queued or this push sees the queue stopped.
        if let Err(rejected) = shared.queue.push(QueueEntry::new(Arc::clone(&record), job)) {
            drop(tasks);
            if let Ok(mut stats) = shared.stats.write() {
                stats.record_rejected();
            }
            drop(rejected);
            debug!(task_id = %id, "Submission rejected: pool closed");
            return Err(PoolError::PoolClosed);
        }
        tasks.insert(id, record);
        drop(tasks);

        debug!(task_id = %id, %priority, "Task submitted");
        Ok(handle)
    }

    /// Cancel a task that no worker has claimed yet.
    ///
    /// Returns `false` if the task is running, finished, already cancelled
    /// or unknown. Running tasks are never interrupted.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        match self.shared.queue.remove_by_id(id) {
            Some(entry) => {
                if let Ok(mut stats) = self.shared.stats.write() {
                    stats.record_cancelled(1);
                }
                // Dropping the entry resolves its handle as cancelled.
                drop(entry);
                debug!(task_id = %id, "Task cancelled");
                true
            }
            None => {
                debug!(task_id = %id, "Cancel missed: task is not pending");
                false
            }
        }
    }

    /// Cancel every task still waiting in the queue. Returns how many.
    pub fn cancel_pending_tasks(&self) -> usize {
        let cancelled = self.shared.queue.clear();
        let count = cancelled.len();
        if count > 0 {
            if let Ok(mut stats) = self.shared.stats.write() {
                stats.record_cancelled(count);
            }
        }
        drop(cancelled);
        info!(count, "Cancelled pending tasks");
        count
    }
}

/// Take the next generated id, or `None` once the counter cannot advance.
///
/// The counter only moves forward and explicit ids push it past themselves,
/// so a generated id is never handed out twice, even after a purge.
fn next_generated_id(counter: &AtomicU64) -> Option<TaskId> {
    counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
        .ok()
        .map(TaskId)
}

/// Build the unit a worker executes for one task.
///
/// Every outcome of `f`, including a panic, ends up in the record and in
/// the result channel; nothing unwinds out of the returned job.
fn wrap<F, R, E>(
    f: F,
    record: Arc<TaskRecord>,
    tx: ResultSender<R>,
    clock: Arc<dyn Clock>,
    stats: Arc<RwLock<TaskStats>>,
) -> Job
where
    F: FnOnce() -> Result<R, E> + Send + 'static,
    R: Send + 'static,
    E: fmt::Display + 'static,
{
    Box::new(move || {
        let id = record.id();
        record.transition(TaskStatus::Running, clock.as_ref(), None);
        debug!(task_id = %id, "Task started");

        let started = clock.now();
        let run = AssertUnwindSafe(|| f().map_err(|e| e.to_string()));
        let outcome = match panic::catch_unwind(run) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(TaskError::Failed(message)),
            Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
        };
        let elapsed = clock.now().saturating_duration_since(started);

        match &outcome {
            Ok(_) => {
                record.transition(TaskStatus::Completed, clock.as_ref(), None);
                debug!(task_id = %id, ?elapsed, "Task completed");
            }
            Err(e) => {
                let message = match e {
                    TaskError::Panicked(msg) => format!("panicked: {msg}"),
                    TaskError::Failed(msg) => msg.clone(),
                    TaskError::Cancelled => e.to_string(),
                };
                record.transition(TaskStatus::Failed, clock.as_ref(), Some(message));
                warn!(task_id = %id, error = %e, "Task failed");
            }
        }

        if let Ok(mut s) = stats.write() {
            s.record_execution(record.priority(), elapsed, outcome.is_ok(), clock.wall());
        }

        // The caller may have dropped its handle; the outcome is still recorded.
        let _ = tx.send(outcome);
    })
}
