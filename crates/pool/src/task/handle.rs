use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::error::TaskError;

use super::record::{TaskInfo, TaskRecord};
use super::types::{Priority, TaskId, TaskStatus};

pub(crate) type ResultSender<R> = oneshot::Sender<Result<R, TaskError>>;

/// Handle to the eventual outcome of a submitted task.
///
/// Await it from async code, or call [`TaskHandle::join`] from a plain
/// thread. If the task is cancelled or discarded before it runs, the
/// handle resolves to [`TaskError::Cancelled`].
#[derive(Debug)]
pub struct TaskHandle<R> {
    record: Arc<TaskRecord>,
    rx: oneshot::Receiver<Result<R, TaskError>>,
}

impl<R> TaskHandle<R> {
    pub(crate) fn new(record: Arc<TaskRecord>) -> (Self, ResultSender<R>) {
        let (tx, rx) = oneshot::channel();
        (Self { record, rx }, tx)
    }

    pub fn id(&self) -> TaskId {
        self.record.id()
    }

    pub fn priority(&self) -> Priority {
        self.record.priority()
    }

    pub fn status(&self) -> TaskStatus {
        self.record.status()
    }

    pub fn info(&self) -> TaskInfo {
        self.record.info()
    }

    /// Block the current thread until the task settles.
    ///
    /// Must not be called from within an async runtime; `.await` the handle
    /// there instead.
    pub fn join(self) -> Result<R, TaskError> {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(TaskError::Cancelled))
    }

    /// Take the outcome if the task has already settled.
    pub fn try_result(&mut self) -> Option<Result<R, TaskError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(TaskError::Cancelled)),
        }
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = Result<R, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(TaskError::Cancelled)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn handle() -> (TaskHandle<u32>, ResultSender<u32>) {
        TaskHandle::new(TaskRecord::new(TaskId(9), Priority::Normal, &SystemClock))
    }

    #[test]
    fn join_returns_sent_value() {
        let (handle, tx) = handle();
        tx.send(Ok(5)).unwrap();
        assert_eq!(handle.join(), Ok(5));
    }

    #[test]
    fn dropped_sender_resolves_cancelled() {
        let (handle, tx) = handle();
        drop(tx);
        assert_eq!(handle.join(), Err(TaskError::Cancelled));
    }

    #[test]
    fn try_result_is_empty_until_sent() {
        let (mut handle, tx) = handle();
        assert!(handle.try_result().is_none());
        tx.send(Err(TaskError::Failed("nope".into()))).unwrap();
        assert_eq!(
            handle.try_result(),
            Some(Err(TaskError::Failed("nope".into())))
        );
    }

    #[tokio::test]
    async fn handle_is_awaitable() {
        let (handle, tx) = handle();
        tx.send(Ok(11)).unwrap();
        assert_eq!(handle.await, Ok(11));
    }
}
