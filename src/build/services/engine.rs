//! Engine facade: intake, cancellation, recovery and run tracking.

use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cancellation::CancellationToken;
use super::error::{BuildEngineError, BuildEngineResult};
use super::pipeline::{BuildPorts, PipelineExecutor, RunOutcome};
use super::queue::{PollerHandle, QueueDispatcher, QueuePoller, TaskQueue};
use super::state_machine::TaskStateMachine;
use crate::build::domain::{
    BranchName, BuildTask, NewBuildTask, PrincipalId, SourceSelector, TaskDomainError, TaskId,
    TaskPhase, TaskStatus, TaskUpdate,
};
use crate::build::ports::{BuildStoreError, SortOrder, TaskQuery};
use crate::config::EngineConfig;

/// Failure cause written to tasks found unfinished at startup.
pub const RECOVERY_MESSAGE: &str = "interrupted by restart";

/// Request payload for starting a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitBuildRequest {
    initiator: PrincipalId,
    source_a: SourceSelector,
    source_b: SourceSelector,
}

impl SubmitBuildRequest {
    /// Creates a request for the two branches.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyBranch`] when a branch is blank.
    pub fn new(
        initiator: PrincipalId,
        branch_a: &str,
        branch_b: &str,
    ) -> Result<Self, TaskDomainError> {
        Ok(Self {
            initiator,
            source_a: SourceSelector::new(BranchName::new(branch_a)?),
            source_b: SourceSelector::new(BranchName::new(branch_b)?),
        })
    }

    /// Sets the build arguments for source A.
    #[must_use]
    pub fn with_args_a(mut self, args: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.source_a = self.source_a.with_args(args);
        self
    }

    /// Sets the build arguments for source B.
    #[must_use]
    pub fn with_args_b(mut self, args: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.source_b = self.source_b.with_args(args);
        self
    }
}

struct RunSlot {
    cancel: CancellationToken,
    handle: Option<JoinHandle<RunOutcome>>,
}

struct EngineInner<C> {
    ports: BuildPorts,
    executor: PipelineExecutor<C>,
    queue: TaskQueue,
    runs: Mutex<HashMap<TaskId, RunSlot>>,
    intake: tokio::sync::Mutex<()>,
    wake: Arc<Notify>,
    config: Arc<EngineConfig>,
    clock: Arc<C>,
}

/// Single-flight build engine.
///
/// Accepts at most one active task, runs it in the background and tracks
/// each run's handle so callers can cancel or await it.
pub struct BuildEngine<C = DefaultClock> {
    inner: Arc<EngineInner<C>>,
}

impl<C> Clone for BuildEngine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> EngineInner<C> {
    fn runs(&self) -> MutexGuard<'_, HashMap<TaskId, RunSlot>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> BuildEngine<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates an engine over `ports`.
    #[must_use]
    pub fn new(ports: BuildPorts, config: EngineConfig, clock: Arc<C>) -> Self {
        let shared = Arc::new(config);
        let executor =
            PipelineExecutor::new(ports.clone(), Arc::clone(&shared), Arc::clone(&clock));
        Self {
            inner: Arc::new(EngineInner {
                ports,
                executor,
                queue: TaskQueue::new(),
                runs: Mutex::new(HashMap::new()),
                intake: tokio::sync::Mutex::new(()),
                wake: Arc::new(Notify::new()),
                config: shared,
                clock,
            }),
        }
    }

    fn machine(&self) -> &TaskStateMachine<C> {
        self.inner.executor.state_machine()
    }

    /// Creates a task and starts running it in the background.
    ///
    /// Returns the `QUEUED` record without waiting for the run.
    ///
    /// # Errors
    ///
    /// Returns [`BuildEngineError::Contention`] when a task is already
    /// queued or running, and store errors otherwise.
    pub async fn submit(&self, request: SubmitBuildRequest) -> BuildEngineResult<BuildTask> {
        let _intake = self.inner.intake.lock().await;
        if let Some(active) = self.current().await? {
            info!(active = %active.id(), "build rejected: engine busy");
            return Err(BuildEngineError::Contention {
                active: active.id(),
            });
        }

        let draft = NewBuildTask::new(
            request.initiator,
            request.source_a,
            request.source_b,
            &*self.inner.clock,
        );
        let created = self.inner.ports.store.create_task(draft).await?;
        info!(task_id = %created.id(), token = %created.token(), "task created");
        self.inner
            .ports
            .events
            .task_update(TaskUpdate::from_task(&created, TaskPhase::Created));

        let queued = self.machine().enqueue(created.id()).await?;
        self.launch(queued.id());
        Ok(queued)
    }

    /// Cancels a task that has not finished.
    ///
    /// # Errors
    ///
    /// Returns [`BuildEngineError::NotFound`] for unknown tasks and
    /// [`BuildEngineError::AlreadyFinished`] for terminal ones.
    pub async fn cancel(&self, task_id: TaskId) -> BuildEngineResult<BuildTask> {
        let task = self
            .inner
            .ports
            .store
            .find_task(task_id)
            .await?
            .ok_or(BuildEngineError::NotFound(task_id))?;
        if task.status().is_terminal() {
            return Err(BuildEngineError::AlreadyFinished {
                task_id,
                status: task.status(),
            });
        }

        let cancelled = match self.machine().cancel(task_id).await {
            Ok(cancelled) => cancelled,
            Err(BuildEngineError::Store(BuildStoreError::Transition(
                TaskDomainError::TaskFinished { status, .. },
            ))) => return Err(BuildEngineError::AlreadyFinished { task_id, status }),
            Err(err) => return Err(err),
        };
        if let Some(slot) = self.inner.runs().get(&task_id) {
            slot.cancel.cancel();
        }
        let was_queued = self.inner.queue.remove(task_id);
        info!(task_id = %task_id, was_queued, "cancellation requested");
        self.inner.wake.notify_one();
        Ok(cancelled)
    }

    /// Waits for the most recent run of `task_id`.
    ///
    /// Returns `None` when no run handle is pending for the task. A finished
    /// run nobody joined is forgotten once the next run launches.
    pub async fn join(&self, task_id: TaskId) -> Option<RunOutcome> {
        let handle = self
            .inner
            .runs()
            .get_mut(&task_id)
            .and_then(|slot| slot.handle.take())?;
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(err) => RunOutcome::Failed {
                cause: err.to_string(),
            },
        };
        self.forget_joined(task_id);
        Some(outcome)
    }

    /// Returns the newest task that is queued or running.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub async fn current(&self) -> BuildEngineResult<Option<BuildTask>> {
        let query = TaskQuery::new()
            .with_statuses(TaskStatus::ACTIVE)
            .ordered(SortOrder::NewestFirst)
            .limit(1);
        let mut active = self.inner.ports.store.query_tasks(&query).await?;
        Ok(active.pop())
    }

    /// Returns the 1-based queue rank of `task_id`.
    #[must_use]
    pub fn queue_position(&self, task_id: TaskId) -> Option<NonZeroUsize> {
        self.inner.queue.position(task_id)
    }

    /// Fails every task left unfinished by a previous process.
    ///
    /// Each task found `PENDING`, `QUEUED` or `RUNNING` becomes `FAILED`
    /// with [`RECOVERY_MESSAGE`] and any lock it holds is released. Call it
    /// once at startup, before submitting work.
    ///
    /// # Errors
    ///
    /// Returns store or lock errors.
    pub async fn recover(&self) -> BuildEngineResult<Vec<TaskId>> {
        let query = TaskQuery::new()
            .with_statuses(TaskStatus::UNFINISHED)
            .ordered(SortOrder::OldestFirst);
        let stale = self.inner.ports.store.query_tasks(&query).await?;

        let mut recovered = Vec::with_capacity(stale.len());
        for task in stale {
            let task_id = task.id();
            self.machine().fail(task_id, RECOVERY_MESSAGE).await?;
            let released = self.inner.ports.lock.release(task_id).await?;
            self.inner.queue.remove(task_id);
            warn!(
                task_id = %task_id,
                status = %task.status(),
                released_lock = released,
                "recovered interrupted task"
            );
            recovered.push(task_id);
        }
        Ok(recovered)
    }

    /// Starts the background queue poller.
    #[must_use]
    pub fn start_poller(&self) -> PollerHandle {
        QueuePoller::new(
            self.inner.config.poll_interval(),
            self.inner.config.error_backoff(),
            Arc::clone(&self.inner.wake),
        )
        .spawn(Arc::new(self.clone()))
    }

    /// Interrupts every in-flight run and waits for them to stop.
    ///
    /// Interrupted tasks keep their status; [`BuildEngine::recover`] settles
    /// them on the next start.
    pub async fn shutdown(&self) {
        let handles: Vec<(TaskId, JoinHandle<RunOutcome>)> = {
            let mut runs = self.inner.runs();
            runs.values().for_each(|slot| slot.cancel.cancel());
            runs.iter_mut()
                .filter_map(|(task_id, slot)| slot.handle.take().map(|handle| (*task_id, handle)))
                .collect()
        };
        for (task_id, handle) in handles {
            if let Err(err) = handle.await {
                warn!(task_id = %task_id, error = %err, "run ended abnormally during shutdown");
            }
        }
        info!("build engine stopped");
    }

    fn launch(&self, task_id: TaskId) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let engine = self.clone();
        let mut runs = self.inner.runs();
        runs.retain(|_, slot| !slot.handle.as_ref().is_some_and(JoinHandle::is_finished));
        let handle = tokio::spawn(async move {
            let outcome = engine.inner.executor.run(task_id, token.clone()).await;
            engine.after_run(task_id, &outcome, &token);
            outcome
        });
        runs.insert(
            task_id,
            RunSlot {
                cancel,
                handle: Some(handle),
            },
        );
    }

    /// Requeues a deferred run unless it was cancelled meanwhile. A stale
    /// entry that slips through settles without running when dispatched.
    fn after_run(&self, task_id: TaskId, outcome: &RunOutcome, token: &CancellationToken) {
        match outcome {
            RunOutcome::Deferred if token.is_cancelled() => {
                debug!(task_id = %task_id, "deferred run cancelled; not requeued");
            }
            RunOutcome::Deferred => {
                let position = self.inner.queue.enqueue(task_id);
                info!(
                    task_id = %task_id,
                    position = position.get(),
                    "task waiting for build lock"
                );
            }
            RunOutcome::Succeeded | RunOutcome::Failed { .. } | RunOutcome::Cancelled => {
                self.forget_joined(task_id);
                self.inner.wake.notify_one();
            }
        }
    }

    /// Drops the slot for `task_id` once its handle has been claimed by
    /// [`BuildEngine::join`]. A relaunched slot still holds its handle.
    fn forget_joined(&self, task_id: TaskId) {
        let mut runs = self.inner.runs();
        if runs.get(&task_id).is_some_and(|slot| slot.handle.is_none()) {
            runs.remove(&task_id);
        }
    }

    /// Number of runs the engine still tracks.
    #[cfg(test)]
    #[must_use]
    pub(crate) fn tracked_runs(&self) -> usize {
        self.inner.runs().len()
    }
}

#[async_trait]
impl<C> QueueDispatcher for BuildEngine<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn dispatch_next(&self) -> BuildEngineResult<Option<TaskId>> {
        if self.inner.ports.lock.holder().await?.is_some() {
            return Ok(None);
        }
        let Some(task_id) = self.inner.queue.dequeue() else {
            return Ok(None);
        };
        self.launch(task_id);
        Ok(Some(task_id))
    }
}
