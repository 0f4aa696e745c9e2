//! State store port for tasks, stage logs and artifacts.

use crate::build::domain::{
    Artifact, BuildTask, NewArtifact, NewBuildTask, NewStageLog, PrincipalId, StageLog,
    StageLogClosure, StageLogId, TaskDomainError, TaskId, TaskStatus, TaskToken, TaskTransition,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for state store operations.
pub type BuildStoreResult<T> = Result<T, BuildStoreError>;

/// Ordering applied to task queries by creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Most recently created first.
    #[default]
    NewestFirst,
    /// Oldest first.
    OldestFirst,
}

/// Filter, order and page for task queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    statuses: Vec<TaskStatus>,
    initiator: Option<PrincipalId>,
    order: SortOrder,
    offset: usize,
    limit: Option<usize>,
}

impl TaskQuery {
    /// Creates an unfiltered query, newest first.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts results to the given statuses.
    #[must_use]
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// Restricts results to tasks started by `initiator`.
    #[must_use]
    pub const fn with_initiator(mut self, initiator: PrincipalId) -> Self {
        self.initiator = Some(initiator);
        self
    }

    /// Sets the creation-time ordering.
    #[must_use]
    pub const fn ordered(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Skips the first `offset` matches.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Returns at most `limit` matches.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the status filter; empty means any status.
    #[must_use]
    pub fn statuses(&self) -> &[TaskStatus] {
        &self.statuses
    }

    /// Returns the initiator filter.
    #[must_use]
    pub const fn initiator(&self) -> Option<PrincipalId> {
        self.initiator
    }

    /// Returns the ordering.
    #[must_use]
    pub const fn order(&self) -> SortOrder {
        self.order
    }

    /// Returns the number of skipped matches.
    #[must_use]
    pub const fn skip(&self) -> usize {
        self.offset
    }

    /// Returns the page size.
    #[must_use]
    pub const fn take(&self) -> Option<usize> {
        self.limit
    }

    /// Returns whether `task` passes the filters.
    #[must_use]
    pub fn matches(&self, task: &BuildTask) -> bool {
        let status_ok = self.statuses.is_empty() || self.statuses.contains(&task.status());
        let initiator_ok = self
            .initiator
            .is_none_or(|initiator| initiator == task.initiator());
        status_ok && initiator_ok
    }
}

/// Durable record of tasks, stage logs and artifacts.
///
/// Implementations must give read-committed visibility: a status written by
/// the executor is visible to the next read from any caller.
#[async_trait]
pub trait BuildStore: Send + Sync {
    /// Inserts a new task in `PENDING` and assigns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`BuildStoreError::DuplicateToken`] when the token already
    /// exists.
    async fn create_task(&self, draft: NewBuildTask) -> BuildStoreResult<BuildTask>;

    /// Finds a task by identifier.
    async fn find_task(&self, id: TaskId) -> BuildStoreResult<Option<BuildTask>>;

    /// Finds a task by external token.
    async fn find_task_by_token(&self, token: TaskToken) -> BuildStoreResult<Option<BuildTask>>;

    /// Atomically loads a task, applies `transition` and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`BuildStoreError::TaskNotFound`] for unknown tasks and
    /// [`BuildStoreError::Transition`] when the state machine rejects the
    /// transition. A rejected transition leaves the record untouched.
    async fn update_task(
        &self,
        id: TaskId,
        transition: TaskTransition,
    ) -> BuildStoreResult<BuildTask>;

    /// Returns tasks matching `query`.
    async fn query_tasks(&self, query: &TaskQuery) -> BuildStoreResult<Vec<BuildTask>>;

    /// Opens a stage log at stage start.
    ///
    /// # Errors
    ///
    /// Returns [`BuildStoreError::TaskNotFound`] when the task is unknown.
    async fn open_stage_log(&self, new: NewStageLog) -> BuildStoreResult<StageLog>;

    /// Finalises a stage log.
    ///
    /// # Errors
    ///
    /// Returns [`BuildStoreError::StageLogNotFound`] for unknown logs and
    /// [`BuildStoreError::Transition`] when the log is already closed.
    async fn close_stage_log(
        &self,
        id: StageLogId,
        closure: StageLogClosure,
    ) -> BuildStoreResult<StageLog>;

    /// Returns a task's stage logs in start order.
    async fn stage_logs(&self, task_id: TaskId) -> BuildStoreResult<Vec<StageLog>>;

    /// Records the artifact of a successful task.
    ///
    /// # Errors
    ///
    /// Returns [`BuildStoreError::DuplicateArtifact`] when the task already
    /// has an artifact.
    async fn create_artifact(&self, new: NewArtifact) -> BuildStoreResult<Artifact>;

    /// Finds the artifact produced by a task.
    async fn find_artifact(&self, task_id: TaskId) -> BuildStoreResult<Option<Artifact>>;
}

/// Errors returned by state store implementations.
#[derive(Debug, Clone, Error)]
pub enum BuildStoreError {
    /// A task with the same token already exists.
    #[error("duplicate task token: {0}")]
    DuplicateToken(TaskToken),

    /// The task was not found.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The stage log was not found.
    #[error("stage log not found: {0}")]
    StageLogNotFound(StageLogId),

    /// The task already owns an artifact.
    #[error("task {0} already has an artifact")]
    DuplicateArtifact(TaskId),

    /// The state machine rejected the change.
    #[error(transparent)]
    Transition(#[from] TaskDomainError),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl BuildStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
