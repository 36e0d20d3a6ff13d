//! Task group - fan out concurrent units and join their results
//!
//! Every dispatched unit runs as its own tokio task. A supervisor task
//! awaits it and reports `(key, result)` through a channel, so results
//! arrive in completion order and a panicking unit still reports back
//! under its key.

use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinError;

type Joined<K, T> = (K, Result<T, JoinError>);

/// A set of concurrent units joined as one
pub struct TaskGroup<K, T> {
    sender: mpsc::UnboundedSender<Joined<K, T>>,
    receiver: mpsc::UnboundedReceiver<Joined<K, T>>,
    dispatched: usize,
}

impl<K, T> TaskGroup<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
{
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver,
            dispatched: 0,
        }
    }

    /// Start `unit` concurrently, reporting its result under `key`
    pub fn dispatch<F>(&mut self, key: K, unit: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let handle = tokio::spawn(unit);
        let sender = self.sender.clone();

        tokio::spawn(async move {
            let result = handle.await;
            // The receiver only goes away when the group itself is dropped
            let _ = sender.send((key, result));
        });

        self.dispatched += 1;
    }

    pub fn len(&self) -> usize {
        self.dispatched
    }

    pub fn is_empty(&self) -> bool {
        self.dispatched == 0
    }

    /// Wait for every dispatched unit, results in arrival order
    pub async fn join(self) -> Vec<Joined<K, T>> {
        let TaskGroup {
            sender,
            mut receiver,
            dispatched,
        } = self;
        drop(sender);

        let mut results = Vec::with_capacity(dispatched);
        while let Some(joined) = receiver.recv().await {
            results.push(joined);
        }
        results
    }
}

impl<K, T> Default for TaskGroup<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
