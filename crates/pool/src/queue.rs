//! Blocking, priority-ordered buffer of pending tasks.
//!
//! Entries are ordered by priority (highest first), then by monotonic submit
//! time, then by insertion sequence, so equal timestamps still dequeue in a
//! deterministic order. One mutex guards the heap together with the
//! in-flight counter; two condition variables share it: `available` wakes
//! consumers, `idle` wakes callers waiting for the queue to drain.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::task::{Priority, TaskId, TaskRecord, TaskStatus};

/// Type-erased unit of work: the user closure plus its result producer.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// A pending task as stored in the queue.
///
/// Ownership moves to the worker that pops it. Dropping an entry without
/// running it drops the result producer, which resolves the task's handle
/// as cancelled.
pub struct QueueEntry {
    record: Arc<TaskRecord>,
    submitted: Instant,
    seq: u64,
    job: Job,
}

impl QueueEntry {
    pub(crate) fn new(record: Arc<TaskRecord>, job: Job) -> Self {
        Self {
            submitted: record.queued_at(),
            record,
            seq: 0,
            job,
        }
    }

    pub fn id(&self) -> TaskId {
        self.record.id()
    }

    pub fn priority(&self) -> Priority {
        self.record.priority()
    }

    pub fn record(&self) -> &Arc<TaskRecord> {
        &self.record
    }

    /// Execute the wrapped job, consuming the entry.
    pub(crate) fn run(self) {
        (self.job)()
    }
}

impl fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEntry")
            .field("id", &self.id())
            .field("priority", &self.priority())
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // BinaryHeap pops the greatest entry: highest priority, then oldest.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority()
            .cmp(&other.priority())
            .then_with(|| other.submitted.cmp(&self.submitted))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<QueueEntry>,
    stopped: bool,
    in_flight: usize,
    next_seq: u64,
}

impl QueueState {
    fn pop_claimed(&mut self) -> Option<QueueEntry> {
        let entry = self.heap.pop()?;
        self.in_flight += 1;
        Some(entry)
    }

    fn is_idle(&self) -> bool {
        self.heap.is_empty() && self.in_flight == 0
    }
}

/// Thread-safe priority queue shared by the pool's workers.
#[derive(Debug)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    idle: Condvar,
    clock: Arc<dyn Clock>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl TaskQueue {
    /// Create an empty queue. `clock` stamps records cancelled in place.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            idle: Condvar::new(),
            clock,
        }
    }

    /// Insert an entry and wake one waiting consumer.
    ///
    /// Once the queue is stopped the entry is handed back untouched.
    pub fn push(&self, mut entry: QueueEntry) -> Result<(), QueueEntry> {
        let mut state = self.lock();
        if state.stopped {
            return Err(entry);
        }
        entry.seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(entry);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Claim the best entry if one is ready.
    ///
    /// A claimed entry counts as in flight until [`TaskQueue::task_done`].
    pub fn try_pop(&self) -> Option<QueueEntry> {
        self.lock().pop_claimed()
    }

    /// Block until an entry is available. `None` once stopped and drained.
    pub fn wait_and_pop(&self) -> Option<QueueEntry> {
        let mut state = self.lock();
        loop {
            if let Some(entry) = state.pop_claimed() {
                return Some(entry);
            }
            if state.stopped {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Like [`TaskQueue::wait_and_pop`], but gives up after `timeout`.
    ///
    /// A timeout too large to represent as a deadline waits without bound.
    pub fn wait_and_pop_timeout(&self, timeout: Duration) -> Option<QueueEntry> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait_and_pop();
        };
        let mut state = self.lock();
        loop {
            if let Some(entry) = state.pop_claimed() {
                return Some(entry);
            }
            if state.stopped {
                return None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            state = self
                .available
                .wait_timeout(state, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    /// Close the queue. Consumers drain what is left, then see `None`.
    pub fn stop(&self) {
        let mut state = self.lock();
        if state.stopped {
            return;
        }
        state.stopped = true;
        drop(state);
        self.available.notify_all();
        self.idle.notify_all();
    }

    /// Remove every pending entry and mark each record cancelled.
    ///
    /// The entries are returned so the caller drops them, and with them the
    /// user closures, outside the queue lock.
    pub fn clear(&self) -> Vec<QueueEntry> {
        let mut state = self.lock();
        let drained: Vec<QueueEntry> = state.heap.drain().collect();
        for entry in &drained {
            entry
                .record
                .transition(TaskStatus::Cancelled, self.clock.as_ref(), None);
        }
        let idle = state.is_idle();
        drop(state);
        if idle {
            self.idle.notify_all();
        }
        drained
    }

    /// Extract the entry with `id`, marking it cancelled. O(n).
    pub fn remove_by_id(&self, id: TaskId) -> Option<QueueEntry> {
        let mut state = self.lock();
        if !state.heap.iter().any(|entry| entry.id() == id) {
            return None;
        }
        let (mut matched, rest): (Vec<QueueEntry>, Vec<QueueEntry>) =
            std::mem::take(&mut state.heap)
                .into_vec()
                .into_iter()
                .partition(|entry| entry.id() == id);
        state.heap = BinaryHeap::from(rest);
        let removed = matched.pop();
        if let Some(entry) = &removed {
            entry
                .record
                .transition(TaskStatus::Cancelled, self.clock.as_ref(), None);
        }
        let idle = state.is_idle();
        drop(state);
        if idle {
            self.idle.notify_all();
        }
        removed
    }

    /// Mark one claimed entry as finished.
    pub fn task_done(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        let idle = state.is_idle();
        drop(state);
        if idle {
            self.idle.notify_all();
        }
    }

    /// Block until nothing is pending and nothing is in flight.
    pub fn wait_idle(&self) {
        let state = self.lock();
        let _idle = self
            .idle
            .wait_while(state, |s| !s.is_idle())
            .unwrap_or_else(|e| e.into_inner());
    }

    /// Bounded [`TaskQueue::wait_idle`]. Returns whether the queue went idle.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .idle
            .wait_timeout_while(state, timeout, |s| !s.is_idle())
            .unwrap_or_else(|e| e.into_inner());
        state.is_idle()
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Whether the queue is stopped and has nothing left to hand out.
    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.stopped && state.heap.is_empty()
    }

    /// Entries popped but not yet reported done.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::clock::ManualClock;

    fn entry(clock: &dyn Clock, id: u64, priority: Priority) -> QueueEntry {
        QueueEntry::new(TaskRecord::new(TaskId(id), priority, clock), Box::new(|| {}))
    }

    fn drain_ids(queue: &TaskQueue) -> Vec<u64> {
        std::iter::from_fn(|| queue.try_pop())
            .map(|e| e.id().get())
            .collect()
    }

    #[test]
    fn higher_priority_pops_first() {
        let clock = Arc::new(ManualClock::new());
        let queue = TaskQueue::new(clock.clone());

        for (id, priority) in [
            (1, Priority::Low),
            (2, Priority::Critical),
            (3, Priority::Normal),
            (4, Priority::High),
        ] {
            queue.push(entry(clock.as_ref(), id, priority)).unwrap();
            clock.advance(Duration::from_millis(1));
        }

        assert_eq!(drain_ids(&queue), vec![2, 4, 3, 1]);
    }

    #[test]
    fn equal_priority_is_fifo_by_submit_time() {
        let clock = Arc::new(ManualClock::new());
        let queue = TaskQueue::new(clock.clone());

        for id in 1..=5 {
            queue.push(entry(clock.as_ref(), id, Priority::Normal)).unwrap();
            clock.advance(Duration::from_micros(10));
        }

        assert_eq!(drain_ids(&queue), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn identical_timestamps_break_ties_by_insertion() {
        let clock = Arc::new(ManualClock::new());
        let queue = TaskQueue::new(clock.clone());

        // Clock never advances: every entry carries the same submit time.
        for id in [30, 10, 20] {
            queue.push(entry(clock.as_ref(), id, Priority::High)).unwrap();
        }

        assert_eq!(drain_ids(&queue), vec![30, 10, 20]);
    }

    #[test]
    fn earlier_submit_time_wins_over_insertion_order() {
        let clock = Arc::new(ManualClock::new());
        let queue = TaskQueue::new(clock.clone());

        let early = entry(clock.as_ref(), 1, Priority::Normal);
        clock.advance(Duration::from_millis(5));
        let late = entry(clock.as_ref(), 2, Priority::Normal);

        queue.push(late).unwrap();
        queue.push(early).unwrap();

        assert_eq!(drain_ids(&queue), vec![1, 2]);
    }

    #[test]
    fn try_pop_on_empty_queue() {
        let queue = TaskQueue::default();
        assert!(queue.try_pop().is_none());
        assert_eq!(queue.in_flight(), 0);
    }

    #[test]
    fn push_after_stop_is_rejected() {
        let queue = TaskQueue::default();
        queue.stop();
        queue.stop();
        let rejected = queue.push(entry(&SystemClock, 1, Priority::Normal));
        assert!(rejected.is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn stop_wakes_blocked_consumer() {
        let queue = Arc::new(TaskQueue::default());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_and_pop().is_none())
        };

        thread::sleep(Duration::from_millis(50));
        queue.stop();
        assert!(consumer.join().unwrap());
    }

    #[test]
    fn stopped_queue_still_drains() {
        let queue = TaskQueue::default();
        queue.push(entry(&SystemClock, 1, Priority::Low)).unwrap();
        queue.push(entry(&SystemClock, 2, Priority::Low)).unwrap();
        queue.stop();

        assert!(queue.wait_and_pop().is_some());
        assert!(queue.wait_and_pop().is_some());
        assert!(queue.wait_and_pop().is_none());
        assert!(queue.is_drained());
    }

    #[test]
    fn wait_and_pop_timeout_expires() {
        let queue = TaskQueue::default();
        let started = Instant::now();
        assert!(queue.wait_and_pop_timeout(Duration::from_millis(30)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(!queue.is_stopped());
    }

    #[test]
    fn unbounded_timeout_returns_on_stopped_queue() {
        let queue = TaskQueue::default();
        queue.stop();
        assert!(queue.wait_and_pop_timeout(Duration::MAX).is_none());
    }

    #[test]
    fn unbounded_timeout_still_pops() {
        let queue = TaskQueue::default();
        queue.push(entry(&SystemClock, 7, Priority::Normal)).unwrap();
        let popped = queue.wait_and_pop_timeout(Duration::MAX);
        assert_eq!(popped.map(|e| e.id().get()), Some(7));
        assert_eq!(queue.in_flight(), 1);
    }

    #[test]
    fn push_wakes_a_waiting_consumer() {
        let queue = Arc::new(TaskQueue::default());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                queue
                    .wait_and_pop_timeout(Duration::from_secs(5))
                    .map(|e| e.id().get())
            })
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(entry(&SystemClock, 42, Priority::Normal)).unwrap();
        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn remove_by_id_cancels_only_the_match() {
        let queue = TaskQueue::default();
        for id in 1..=4 {
            queue.push(entry(&SystemClock, id, Priority::Normal)).unwrap();
        }

        let removed = queue.remove_by_id(TaskId(3)).expect("entry 3 queued");
        assert_eq!(removed.record().status(), TaskStatus::Cancelled);
        assert!(queue.remove_by_id(TaskId(3)).is_none());
        assert!(queue.remove_by_id(TaskId(99)).is_none());

        assert_eq!(drain_ids(&queue), vec![1, 2, 4]);
    }

    #[test]
    fn clear_discards_and_cancels_everything() {
        let queue = TaskQueue::default();
        for id in 1..=3 {
            queue.push(entry(&SystemClock, id, Priority::High)).unwrap();
        }

        let cleared = queue.clear();
        assert_eq!(cleared.len(), 3);
        assert!(cleared
            .iter()
            .all(|e| e.record().status() == TaskStatus::Cancelled));
        assert!(queue.is_empty());
        assert!(queue.wait_idle_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn idle_waits_for_in_flight_work() {
        let queue = Arc::new(TaskQueue::default());
        queue.push(entry(&SystemClock, 1, Priority::Normal)).unwrap();

        let claimed = queue.try_pop().unwrap();
        assert_eq!(queue.in_flight(), 1);
        assert!(!queue.wait_idle_timeout(Duration::from_millis(20)));

        let finisher = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                claimed.run();
                queue.task_done();
            })
        };

        queue.wait_idle();
        assert_eq!(queue.in_flight(), 0);
        finisher.join().unwrap();
    }
}
