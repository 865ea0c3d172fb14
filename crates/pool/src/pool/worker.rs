use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info_span};

use crate::error::PoolError;
use crate::task::PoolState;

use super::core::Shared;

/// Worker threads owned by a pool, plus the size they should converge to.
#[derive(Debug)]
pub(super) struct WorkerSet {
    pub(super) state: PoolState,
    target: usize,
    live: HashMap<usize, JoinHandle<()>>,
    /// Workers that left after a shrink; joined on the next resize or shutdown.
    retired: Vec<JoinHandle<()>>,
    next_index: usize,
}

impl WorkerSet {
    pub(super) fn new(target: usize) -> Self {
        Self {
            state: PoolState::Running,
            target,
            live: HashMap::new(),
            retired: Vec::new(),
            next_index: 0,
        }
    }

    pub(super) fn live_count(&self) -> usize {
        self.live.len()
    }

    pub(super) fn target(&self) -> usize {
        self.target
    }

    pub(super) fn set_target(&mut self, target: usize) {
        self.target = target;
    }

    /// Start one more worker thread.
    ///
    /// The caller holds the worker-set lock, so the new thread cannot try to
    /// retire before its handle is registered.
    pub(super) fn spawn(&mut self, shared: &Arc<Shared>) -> Result<(), PoolError> {
        let index = self.next_index;
        let mut builder =
            thread::Builder::new().name(format!("{}-{}", shared.config.thread_name_prefix, index));
        if let Some(kb) = shared.config.stack_size_kb {
            builder = builder.stack_size(kb * 1024);
        }

        let worker_shared = Arc::clone(shared);
        let handle = builder.spawn(move || run(worker_shared, index))?;
        self.next_index += 1;
        self.live.insert(index, handle);
        Ok(())
    }

    /// Called by worker `index` between tasks. Returns true if it should exit.
    pub(super) fn try_retire(&mut self, index: usize) -> bool {
        if self.state != PoolState::Running || self.live.len() <= self.target {
            return false;
        }
        match self.live.remove(&index) {
            Some(handle) => {
                self.retired.push(handle);
                true
            }
            None => false,
        }
    }

    pub(super) fn take_retired(&mut self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut self.retired)
    }

    /// Remove every handle, live and retired, for joining.
    pub(super) fn take_all(&mut self) -> Vec<JoinHandle<()>> {
        let mut handles = self.take_retired();
        handles.extend(self.live.drain().map(|(_, handle)| handle));
        handles
    }
}

/// Worker loop: claim, execute, report, repeat.
///
/// Exits when the pool shrinks below this worker's slot or once the queue
/// is stopped and drained.
fn run(shared: Arc<Shared>, index: usize) {
    let span = info_span!("worker", pool = %shared.config.name, worker = index);
    let _guard = span.enter();
    debug!(thread = ?thread::current().id(), "Worker started");

    let idle_poll = shared.config.idle_poll_interval();
    loop {
        if shared.workers().try_retire(index) {
            debug!("Worker retiring after resize");
            break;
        }

        match shared.queue.wait_and_pop_timeout(idle_poll) {
            Some(entry) => {
                let id = entry.id();
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| entry.run())) {
                    error!(
                        task_id = %id,
                        panic = %panic_message(payload.as_ref()),
                        "Task wrapper panicked"
                    );
                }
                shared.queue.task_done();
            }
            None if shared.queue.is_drained() => break,
            None => {}
        }
    }

    debug!("Worker stopped");
}

/// Best-effort text of a panic payload.
pub(super) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
