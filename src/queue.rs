//! Update queue: the only path by which background work mutates state
//!
//! Workers build a closure capturing the mutation they want and send it here.
//! The event loop is the single consumer and runs each command to completion
//! before taking the next one, so state is never written concurrently.

use tokio::sync::mpsc;

/// A state mutation executed on the event loop
pub type Command<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// Create a queue and its single consumer
pub fn channel<S>() -> (UpdateQueue<S>, CommandReceiver<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UpdateQueue { tx }, CommandReceiver { rx })
}

/// Sending half, cloned into every worker
///
/// Unbounded so a worker reporting progress never waits on the consumer.
pub struct UpdateQueue<S> {
    tx: mpsc::UnboundedSender<Command<S>>,
}

impl<S> Clone for UpdateQueue<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S> UpdateQueue<S> {
    /// Queue a command. Returns `false` once the consumer is gone.
    pub fn send<F>(&self, cmd: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        if self.tx.send(Box::new(cmd)).is_err() {
            tracing::debug!("Update queue closed, dropping command");
            return false;
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half, owned by the event loop
pub struct CommandReceiver<S> {
    rx: mpsc::UnboundedReceiver<Command<S>>,
}

impl<S> CommandReceiver<S> {
    /// Wait for the next command
    pub async fn recv(&mut self) -> Option<Command<S>> {
        self.rx.recv().await
    }

    /// Run every command that is already queued, in arrival order.
    ///
    /// Returns how many commands ran.
    pub fn drain_and_run(&mut self, state: &mut S) -> usize {
        let mut count = 0;
        while let Ok(cmd) = self.rx.try_recv() {
            cmd(state);
            count += 1;
        }
        count
    }
}
