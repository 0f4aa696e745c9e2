//! FIFO of tasks waiting for the lock, and the poller that drains it.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cancellation::CancellationToken;
use super::error::BuildEngineResult;
use crate::build::domain::TaskId;

/// First-in, first-out list of task identifiers.
///
/// A task appears at most once.
#[derive(Debug, Default)]
pub struct TaskQueue {
    entries: Mutex<VecDeque<TaskId>>,
}

impl TaskQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<TaskId>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Appends `id` unless it is already queued. Returns its 1-based
    /// position.
    pub fn enqueue(&self, id: TaskId) -> NonZeroUsize {
        let mut entries = self.entries();
        if !entries.contains(&id) {
            entries.push_back(id);
        }
        let index = entries.iter().position(|queued| *queued == id).unwrap_or(0);
        NonZeroUsize::MIN.saturating_add(index)
    }

    /// Pops the head of the queue.
    pub fn dequeue(&self) -> Option<TaskId> {
        self.entries().pop_front()
    }

    /// Returns the 1-based rank of `id`, or `None` when it is not queued.
    #[must_use]
    pub fn position(&self, id: TaskId) -> Option<NonZeroUsize> {
        self.entries()
            .iter()
            .position(|queued| *queued == id)
            .map(|index| NonZeroUsize::MIN.saturating_add(index))
    }

    /// Removes `id`. Returns whether it was queued.
    pub fn remove(&self, id: TaskId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|queued| *queued != id);
        entries.len() != before
    }

    /// Returns the number of waiting tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns `true` when nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Hands the next waiting task to the executor.
#[async_trait]
pub trait QueueDispatcher: Send + Sync {
    /// Launches the queue head if the lock is free.
    ///
    /// Returns the launched task, if any.
    ///
    /// # Errors
    ///
    /// Returns lock or store failures; the poller backs off after them.
    async fn dispatch_next(&self) -> BuildEngineResult<Option<TaskId>>;
}

/// Background loop draining the queue.
///
/// Ticks on a fixed interval and whenever [`Notify`] is signalled, which
/// the engine does each time a run finalises.
#[derive(Debug, Clone)]
pub struct QueuePoller {
    interval: Duration,
    error_backoff: Duration,
    wake: Arc<Notify>,
}

impl QueuePoller {
    /// Creates a poller.
    #[must_use]
    pub const fn new(interval: Duration, error_backoff: Duration, wake: Arc<Notify>) -> Self {
        Self {
            interval,
            error_backoff,
            wake,
        }
    }

    /// Spawns the loop on the current runtime.
    #[must_use]
    pub fn spawn(self, dispatcher: Arc<dyn QueueDispatcher>) -> PollerHandle {
        let stop = CancellationToken::new();
        let stopped = stop.clone();
        let handle = tokio::spawn(async move {
            info!(interval = ?self.interval, "queue poller started");
            loop {
                tokio::select! {
                    () = stopped.cancelled() => break,
                    () = self.wake.notified() => {}
                    () = tokio::time::sleep(self.interval) => {}
                }

                match dispatcher.dispatch_next().await {
                    Ok(Some(task_id)) => debug!(task_id = %task_id, "dispatched queued task"),
                    Ok(None) => {}
                    Err(err) => {
                        warn!(error = %err, "queue poll failed; backing off");
                        tokio::select! {
                            () = stopped.cancelled() => break,
                            () = tokio::time::sleep(self.error_backoff) => {}
                        }
                    }
                }
            }
            info!("queue poller stopped");
        });
        PollerHandle { stop, handle }
    }
}

/// Handle controlling a running [`QueuePoller`].
#[derive(Debug)]
pub struct PollerHandle {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollerHandle {
    /// Stops the loop and waits for it to exit.
    pub async fn stop(self) {
        self.stop.cancel();
        if let Err(err) = self.handle.await {
            warn!(error = %err, "queue poller ended abnormally");
        }
    }
}
