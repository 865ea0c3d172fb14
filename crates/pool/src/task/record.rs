use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;

use super::types::{Priority, TaskId, TaskStatus};

/// Tracking record for one submitted task.
///
/// Owned by the pool's tracking map. Handles share it read-only; every
/// mutation goes through [`TaskRecord::transition`], which only follows
/// forward edges of the lifecycle.
#[derive(Debug)]
pub struct TaskRecord {
    id: TaskId,
    priority: Priority,
    queued_at: Instant,
    submitted_at: DateTime<Utc>,
    lifecycle: RwLock<Lifecycle>,
}

#[derive(Debug)]
struct Lifecycle {
    status: TaskStatus,
    started: Option<(Instant, DateTime<Utc>)>,
    finished: Option<(Instant, DateTime<Utc>)>,
    error: Option<String>,
}

/// Point-in-time copy of a [`TaskRecord`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub priority: Priority,
    pub status: TaskStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Time spent queued before a worker claimed it.
    pub wait_time: Option<Duration>,
    /// Time spent executing.
    pub run_time: Option<Duration>,
}

impl TaskRecord {
    pub(crate) fn new(id: TaskId, priority: Priority, clock: &dyn Clock) -> Arc<Self> {
        Arc::new(Self {
            id,
            priority,
            queued_at: clock.now(),
            submitted_at: clock.wall(),
            lifecycle: RwLock::new(Lifecycle {
                status: TaskStatus::Pending,
                started: None,
                finished: None,
                error: None,
            }),
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Monotonic submit time, the secondary queue ordering key.
    pub fn queued_at(&self) -> Instant {
        self.queued_at
    }

    pub fn status(&self) -> TaskStatus {
        self.read().status
    }

    pub fn error(&self) -> Option<String> {
        self.read().error.clone()
    }

    /// Move to `next` if that is a forward edge from the current status.
    ///
    /// Returns `false` and leaves the record untouched otherwise.
    pub(crate) fn transition(
        &self,
        next: TaskStatus,
        clock: &dyn Clock,
        error: Option<String>,
    ) -> bool {
        let mut lifecycle = self.write();
        if !lifecycle.status.can_transition_to(next) {
            return false;
        }
        let stamp = (clock.now(), clock.wall());
        match next {
            TaskStatus::Running => lifecycle.started = Some(stamp),
            _ => lifecycle.finished = Some(stamp),
        }
        lifecycle.status = next;
        if error.is_some() {
            lifecycle.error = error;
        }
        true
    }

    pub fn info(&self) -> TaskInfo {
        let lifecycle = self.read();
        let started = lifecycle.started.map(|(at, _)| at);
        let finished = lifecycle.finished.map(|(at, _)| at);
        TaskInfo {
            id: self.id,
            priority: self.priority,
            status: lifecycle.status,
            submitted_at: self.submitted_at,
            started_at: lifecycle.started.map(|(_, wall)| wall),
            finished_at: lifecycle.finished.map(|(_, wall)| wall),
            error: lifecycle.error.clone(),
            wait_time: started.map(|s| s.saturating_duration_since(self.queued_at)),
            run_time: started
                .zip(finished)
                .map(|(s, f)| f.saturating_duration_since(s)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Lifecycle> {
        self.lifecycle.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Lifecycle> {
        self.lifecycle.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn completed_lifecycle_records_times() {
        let clock = ManualClock::new();
        let record = TaskRecord::new(TaskId(1), Priority::High, &clock);
        assert_eq!(record.status(), TaskStatus::Pending);

        clock.advance(Duration::from_millis(40));
        assert!(record.transition(TaskStatus::Running, &clock, None));
        clock.advance(Duration::from_millis(10));
        assert!(record.transition(TaskStatus::Completed, &clock, None));

        let info = record.info();
        assert_eq!(info.status, TaskStatus::Completed);
        assert_eq!(info.wait_time, Some(Duration::from_millis(40)));
        assert_eq!(info.run_time, Some(Duration::from_millis(10)));
        assert!(info.started_at.is_some());
        assert!(info.finished_at.is_some());
        assert_eq!(info.error, None);
    }

    #[test]
    fn transitions_never_move_backward() {
        let clock = ManualClock::new();
        let record = TaskRecord::new(TaskId(2), Priority::Low, &clock);

        assert!(record.transition(TaskStatus::Running, &clock, None));
        assert!(!record.transition(TaskStatus::Cancelled, &clock, None));
        assert!(!record.transition(TaskStatus::Pending, &clock, None));
        assert!(record.transition(TaskStatus::Failed, &clock, Some("boom".into())));
        assert!(!record.transition(TaskStatus::Completed, &clock, None));

        assert_eq!(record.status(), TaskStatus::Failed);
        assert_eq!(record.error().as_deref(), Some("boom"));
    }

    #[test]
    fn cancelled_task_never_started() {
        let clock = ManualClock::new();
        let record = TaskRecord::new(TaskId(3), Priority::Normal, &clock);
        assert!(record.transition(TaskStatus::Cancelled, &clock, None));
        assert!(!record.transition(TaskStatus::Running, &clock, None));

        let info = record.info();
        assert_eq!(info.status, TaskStatus::Cancelled);
        assert_eq!(info.started_at, None);
        assert_eq!(info.wait_time, None);
        assert!(info.finished_at.is_some());
    }
}
