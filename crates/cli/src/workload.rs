//! Synthetic mixed-priority workload and its report.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use taskyard_pool::{PoolState, PoolStats, Priority, TaskError, TaskHandle, ThreadPool};

use crate::cli::CliArgs;

pub struct Workload {
    tasks: usize,
    work: Duration,
    fail_every: usize,
    cancel_every: usize,
    resize_to: Option<usize>,
    force: bool,
}

/// How each submitted task ended, as seen through its handle.
#[derive(Debug, Default, Serialize)]
pub struct Outcomes {
    pub succeeded: usize,
    pub failed: usize,
    pub panicked: usize,
    pub cancelled: usize,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub pool: String,
    pub state: PoolState,
    pub elapsed: Duration,
    pub outcomes: Outcomes,
    pub stats: PoolStats,
}

impl Workload {
    pub fn from_args(args: &CliArgs) -> Self {
        Self {
            tasks: args.tasks,
            work: Duration::from_millis(args.work_ms),
            fail_every: args.fail_every,
            cancel_every: args.cancel_every,
            resize_to: args.resize_to,
            force: args.force,
        }
    }

    pub fn run(&self, pool: &ThreadPool) -> Result<Report> {
        let started = Instant::now();
        let mut handles: Vec<TaskHandle<usize>> = Vec::with_capacity(self.tasks);

        for i in 0..self.tasks {
            if i == self.tasks / 2 {
                if let Some(size) = self.resize_to {
                    pool.resize(size)?;
                }
            }

            let priority = Priority::ALL[i % Priority::ALL.len()];
            let work = self.work;
            let fails = every(self.fail_every, i);
            let handle = pool.submit_with_priority(priority, move || {
                thread::sleep(work);
                if fails {
                    Err(format!("task {} failed on purpose", i))
                } else {
                    Ok(i)
                }
            })?;

            if every(self.cancel_every, i) && pool.cancel_task(handle.id()) {
                debug!(task_id = %handle.id(), "Cancelled after submission");
            }
            handles.push(handle);
        }

        if self.force {
            warn!(pending = pool.pending_tasks(), "Forcing shutdown");
            pool.force_shutdown();
        } else {
            pool.wait_for_all();
            pool.shutdown();
        }

        let mut outcomes = Outcomes::default();
        for handle in handles {
            match handle.join() {
                Ok(_) => outcomes.succeeded += 1,
                Err(TaskError::Failed(_)) => outcomes.failed += 1,
                Err(TaskError::Panicked(_)) => outcomes.panicked += 1,
                Err(TaskError::Cancelled) => outcomes.cancelled += 1,
            }
        }

        let elapsed = started.elapsed();
        info!(
            succeeded = outcomes.succeeded,
            failed = outcomes.failed,
            cancelled = outcomes.cancelled,
            elapsed_ms = elapsed.as_millis() as u64,
            "Workload finished"
        );

        Ok(Report {
            pool: pool.name().to_string(),
            state: pool.state(),
            elapsed,
            outcomes,
            stats: pool.stats(),
        })
    }
}

/// True for every `n`th task counting from one; `n == 0` disables.
fn every(n: usize, index: usize) -> bool {
    n != 0 && (index + 1) % n == 0
}

impl Report {
    pub fn print(&self) {
        let o = &self.outcomes;
        let s = &self.stats;
        println!("pool {} ({:?}) in {:.2?}", self.pool, self.state, self.elapsed);
        println!(
            "  outcomes: {} ok, {} failed, {} panicked, {} cancelled",
            o.succeeded, o.failed, o.panicked, o.cancelled
        );
        println!(
            "  threads: {} ({} active), pending: {}",
            s.thread_count, s.active_threads, s.pending_tasks
        );
        println!(
            "  tasks: {} submitted, {} completed, {} failed, {} cancelled",
            s.submitted_tasks, s.completed_tasks, s.failed_tasks, s.cancelled_tasks
        );
        for priority in Priority::ALL.iter().rev() {
            let n = s.executed_by_priority.get(priority).copied().unwrap_or(0);
            println!("  {:>8}: {}", priority, n);
        }
        println!(
            "  duration: avg {:.2?}, max {:.2?}",
            s.avg_task_duration, s.max_task_duration
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskyard_pool::PoolConfig;

    fn workload(tasks: usize) -> Workload {
        Workload {
            tasks,
            work: Duration::ZERO,
            fail_every: 0,
            cancel_every: 0,
            resize_to: None,
            force: false,
        }
    }

    fn pool(threads: usize) -> ThreadPool {
        let mut config = PoolConfig::with_threads(threads);
        config.idle_poll_ms = 10;
        ThreadPool::new(config).unwrap()
    }

    #[test]
    fn test_every() {
        assert!(!every(0, 0));
        assert!(every(1, 0));
        assert!(!every(3, 0));
        assert!(every(3, 2));
        assert!(every(3, 5));
    }

    #[test]
    fn test_drain_report() {
        let report = Workload {
            fail_every: 4,
            ..workload(20)
        }
        .run(&pool(2))
        .unwrap();

        assert_eq!(report.outcomes.succeeded, 15);
        assert_eq!(report.outcomes.failed, 5);
        assert_eq!(report.outcomes.cancelled, 0);
        assert_eq!(report.stats.completed_tasks, 15);
        assert_eq!(report.stats.failed_tasks, 5);
        assert_eq!(report.state, PoolState::Stopped);
    }

    #[test]
    fn test_resize_midway() {
        let pool = pool(1);
        let report = Workload {
            resize_to: Some(3),
            ..workload(10)
        }
        .run(&pool)
        .unwrap();

        assert_eq!(report.outcomes.succeeded, 10);
        assert_eq!(report.stats.submitted_tasks, 10);
    }

    #[test]
    fn test_forced_accounts_for_every_task() {
        let report = Workload {
            work: Duration::from_millis(2),
            force: true,
            ..workload(50)
        }
        .run(&pool(1))
        .unwrap();

        let o = &report.outcomes;
        assert_eq!(o.succeeded + o.cancelled, 50);
        assert_eq!(report.stats.cancelled_tasks as usize, o.cancelled);
    }

    #[test]
    fn test_report_serializes() {
        let report = workload(4).run(&pool(1)).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcomes"]["succeeded"], 4);
        assert_eq!(json["stats"]["submitted_tasks"], 4);
    }
}
