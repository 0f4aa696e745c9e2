//! Clock-stamped task transitions with event emission.

use mockable::Clock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::BuildEngineResult;
use crate::build::domain::{
    BuildTask, DurationField, Progress, SourceSlot, StageName, TaskId, TaskPhase, TaskTransition,
    TaskUpdate,
};
use crate::build::ports::{BuildLock, BuildStore, BuildStoreResult, EventSink};

/// Progress message written when a task is queued.
pub const QUEUED_MESSAGE: &str = "Task queued";
/// Progress message written when a run acquires the lock.
pub const STARTED_MESSAGE: &str = "Starting build process";
/// Progress message written when every stage succeeded.
pub const COMPLETED_MESSAGE: &str = "Build completed";
/// Error message written by a user cancellation.
pub const CANCELLED_MESSAGE: &str = "task cancelled by user";

/// Applies task transitions through the store and announces them.
///
/// Every mutation is one atomic store update; the announcement follows the
/// committed write so observers never see a state the store rejected.
pub struct TaskStateMachine<C> {
    store: Arc<dyn BuildStore>,
    lock: Arc<dyn BuildLock>,
    events: Arc<dyn EventSink>,
    clock: Arc<C>,
}

impl<C> Clone for TaskStateMachine<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lock: Arc::clone(&self.lock),
            events: Arc::clone(&self.events),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C> TaskStateMachine<C>
where
    C: Clock + Send + Sync,
{
    /// Creates a state machine over the given ports.
    #[must_use]
    pub const fn new(
        store: Arc<dyn BuildStore>,
        lock: Arc<dyn BuildLock>,
        events: Arc<dyn EventSink>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            store,
            lock,
            events,
            clock,
        }
    }

    fn announce(&self, task: &BuildTask, phase: TaskPhase) {
        self.events.task_update(TaskUpdate::from_task(task, phase));
    }

    fn announce_outcome(&self, task: &BuildTask, phase: TaskPhase, success: bool) {
        self.events
            .task_update(TaskUpdate::from_task(task, phase).with_outcome(success));
    }

    /// Moves a `PENDING` task to `QUEUED`.
    ///
    /// # Errors
    ///
    /// Returns store or transition errors.
    pub async fn enqueue(&self, id: TaskId) -> BuildStoreResult<BuildTask> {
        let transition = TaskTransition::Enqueue {
            message: QUEUED_MESSAGE.to_owned(),
        };
        let task = self.store.update_task(id, transition).await?;
        debug!(task_id = %id, "task queued");
        self.announce(&task, TaskPhase::Queued);
        Ok(task)
    }

    /// Moves a task holding the lock to `RUNNING`.
    ///
    /// # Errors
    ///
    /// Returns store or transition errors.
    pub async fn start(&self, id: TaskId) -> BuildStoreResult<BuildTask> {
        let transition = TaskTransition::Start {
            at: self.clock.utc(),
            message: STARTED_MESSAGE.to_owned(),
        };
        let task = self.store.update_task(id, transition).await?;
        info!(task_id = %id, "task started");
        self.announce(&task, TaskPhase::Started);
        Ok(task)
    }

    /// Records entry into `stage` at checkpoint `progress`.
    ///
    /// # Errors
    ///
    /// Returns store or transition errors.
    pub async fn enter_stage(
        &self,
        id: TaskId,
        stage: StageName,
        progress: Progress,
        message: &str,
    ) -> BuildStoreResult<BuildTask> {
        let transition = TaskTransition::EnterStage {
            stage,
            progress,
            message: message.to_owned(),
        };
        let task = self.store.update_task(id, transition).await?;
        info!(task_id = %id, stage = %stage, progress = %progress, "stage started");
        self.announce(&task, TaskPhase::Progress);
        Ok(task)
    }

    /// Records the revision a fetch stage resolved.
    ///
    /// # Errors
    ///
    /// Returns store or transition errors.
    pub async fn record_revision(
        &self,
        id: TaskId,
        slot: SourceSlot,
        revision: String,
    ) -> BuildStoreResult<BuildTask> {
        self.store
            .update_task(id, TaskTransition::RecordRevision { slot, revision })
            .await
    }

    /// Records a stage duration in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns store or transition errors.
    pub async fn record_duration(
        &self,
        id: TaskId,
        field: DurationField,
        millis: i64,
    ) -> BuildStoreResult<BuildTask> {
        self.store
            .update_task(id, TaskTransition::RecordStageDuration { field, millis })
            .await
    }

    /// Marks a running task `SUCCESS` and announces the outcome.
    ///
    /// # Errors
    ///
    /// Returns store or transition errors.
    pub async fn succeed(&self, id: TaskId) -> BuildStoreResult<BuildTask> {
        let transition = TaskTransition::Succeed {
            at: self.clock.utc(),
            message: COMPLETED_MESSAGE.to_owned(),
        };
        let task = self.store.update_task(id, transition).await?;
        info!(task_id = %id, total_duration_ms = ?task.total_duration_ms(), "task succeeded");
        self.announce_outcome(&task, TaskPhase::Completed, true);
        Ok(task)
    }

    /// Marks a task `FAILED` with `cause` and announces the outcome.
    ///
    /// # Errors
    ///
    /// Returns store or transition errors.
    pub async fn fail(&self, id: TaskId, cause: &str) -> BuildStoreResult<BuildTask> {
        let transition = TaskTransition::Fail {
            at: self.clock.utc(),
            cause: cause.to_owned(),
        };
        let task = self.store.update_task(id, transition).await?;
        warn!(task_id = %id, cause, "task failed");
        self.announce_outcome(&task, TaskPhase::Failed, false);
        Ok(task)
    }

    /// Marks a task `CANCELLED` and releases the lock if this task holds it.
    ///
    /// # Errors
    ///
    /// Returns store, transition or lock errors. The status change is
    /// committed before the lock is released.
    pub async fn cancel(&self, id: TaskId) -> BuildEngineResult<BuildTask> {
        let transition = TaskTransition::Cancel {
            at: self.clock.utc(),
            reason: CANCELLED_MESSAGE.to_owned(),
        };
        let task = self.store.update_task(id, transition).await?;
        let released = self.lock.release(id).await?;
        info!(task_id = %id, released_lock = released, "task cancelled");
        self.announce_outcome(&task, TaskPhase::Cancelled, false);
        Ok(task)
    }
}
