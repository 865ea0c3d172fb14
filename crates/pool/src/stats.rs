use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::task::Priority;

/// Counters fed by task lifecycle transitions.
///
/// Lives behind its own lock so aggregation never contends with the queue.
#[derive(Debug, Clone, Default)]
pub struct TaskStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Finished executions (completed or failed) by priority.
    pub executed_by_priority: HashMap<Priority, u64>,
    /// Mean execution time over finished executions.
    pub avg_duration: Duration,
    pub max_duration: Duration,
    pub last_finished: Option<DateTime<Utc>>,
}

impl TaskStats {
    pub fn record_submitted(&mut self) {
        self.submitted += 1;
    }

    /// Undo a [`TaskStats::record_submitted`] whose push was rejected.
    pub fn record_rejected(&mut self) {
        self.submitted = self.submitted.saturating_sub(1);
    }

    pub fn record_cancelled(&mut self, count: usize) {
        self.cancelled += count as u64;
    }

    /// Record a finished execution.
    pub fn record_execution(
        &mut self,
        priority: Priority,
        duration: Duration,
        succeeded: bool,
        at: DateTime<Utc>,
    ) {
        if succeeded {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        *self.executed_by_priority.entry(priority).or_default() += 1;
        self.last_finished = Some(at);
        self.max_duration = self.max_duration.max(duration);

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = self.completed + self.failed;
        self.avg_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }
}

/// Snapshot of pool state returned by [`ThreadPool::stats`](crate::ThreadPool::stats).
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub thread_count: usize,
    pub active_threads: usize,
    pub pending_tasks: usize,
    pub submitted_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub cancelled_tasks: u64,
    pub executed_by_priority: HashMap<Priority, u64>,
    pub avg_task_duration: Duration,
    pub max_task_duration: Duration,
    pub last_finished: Option<DateTime<Utc>>,
    pub uptime: Duration,
}
