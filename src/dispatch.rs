//! Run blocking work off the event loop and report back through the queue

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinError;

use crate::queue::UpdateQueue;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Background task panicked: {0}")]
    Panicked(String),
    #[error("Background task was cancelled")]
    Cancelled,
}

impl From<JoinError> for WorkerError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            let payload = err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            WorkerError::Panicked(message)
        } else {
            WorkerError::Cancelled
        }
    }
}

/// Spawns one worker per operation
pub struct Dispatcher<S> {
    queue: UpdateQueue<S>,
    runtime: Handle,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<S: 'static> Dispatcher<S> {
    pub fn new(queue: UpdateQueue<S>, runtime: Handle) -> Self {
        Self { queue, runtime }
    }

    pub fn queue(&self) -> &UpdateQueue<S> {
        &self.queue
    }

    /// Run `work` on a blocking worker thread, then queue `report` with its
    /// outcome.
    ///
    /// `work` may send intermediate commands through the queue it is given;
    /// they are always applied before `report`. A panicking worker is
    /// reported as [`WorkerError::Panicked`] so the state machine never
    /// stays stuck in a busy state.
    pub fn spawn<T, W, R>(&self, task: &'static str, work: W, report: R)
    where
        T: Send + 'static,
        W: FnOnce(&UpdateQueue<S>) -> T + Send + 'static,
        R: FnOnce(&mut S, Result<T, WorkerError>) + Send + 'static,
    {
        let queue = self.queue.clone();
        let worker_queue = self.queue.clone();

        tracing::debug!(task, "Dispatching background task");
        let job = self.runtime.spawn_blocking(move || work(&worker_queue));

        self.runtime.spawn(async move {
            let outcome = job.await.map_err(|e| {
                let err = WorkerError::from(e);
                tracing::error!(task, error = %err, "Background task failed");
                err
            });
            queue.send(move |state| report(state, outcome));
        });
    }
}
