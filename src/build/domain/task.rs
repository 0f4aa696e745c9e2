//! Build task aggregate root and its state machine.

use super::{
    BranchName, PrincipalId, Progress, SourceSelector, SourceSlot, StageName, TaskDomainError,
    TaskId, TaskStatus, TaskToken,
};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Task field that receives the duration of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationField {
    /// Duration of the source A fetch.
    FetchA,
    /// Duration of the source A build.
    BuildA,
    /// Duration of the source B fetch.
    FetchB,
    /// Duration of the source B build.
    BuildB,
}

/// Per-stage durations in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDurations {
    fetch_a: Option<i64>,
    build_a: Option<i64>,
    fetch_b: Option<i64>,
    build_b: Option<i64>,
}

impl StageDurations {
    /// Rebuilds durations from persisted columns.
    #[must_use]
    pub const fn from_parts(
        fetch_a: Option<i64>,
        build_a: Option<i64>,
        fetch_b: Option<i64>,
        build_b: Option<i64>,
    ) -> Self {
        Self {
            fetch_a,
            build_a,
            fetch_b,
            build_b,
        }
    }

    /// Returns the recorded duration for `field`, in milliseconds.
    #[must_use]
    pub const fn get(&self, field: DurationField) -> Option<i64> {
        match field {
            DurationField::FetchA => self.fetch_a,
            DurationField::BuildA => self.build_a,
            DurationField::FetchB => self.fetch_b,
            DurationField::BuildB => self.build_b,
        }
    }

    const fn set(&mut self, field: DurationField, millis: i64) {
        let slot = match field {
            DurationField::FetchA => &mut self.fetch_a,
            DurationField::BuildA => &mut self.build_a,
            DurationField::FetchB => &mut self.fetch_b,
            DurationField::BuildB => &mut self.build_b,
        };
        *slot = Some(millis);
    }
}

/// Creation payload for a task before the store assigns its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBuildTask {
    token: TaskToken,
    initiator: PrincipalId,
    source_a: SourceSelector,
    source_b: SourceSelector,
    created_at: DateTime<Utc>,
}

impl NewBuildTask {
    /// Creates a draft task with a fresh token.
    #[must_use]
    pub fn new(
        initiator: PrincipalId,
        source_a: SourceSelector,
        source_b: SourceSelector,
        clock: &impl Clock,
    ) -> Self {
        Self {
            token: TaskToken::new(),
            initiator,
            source_a,
            source_b,
            created_at: clock.utc(),
        }
    }

    /// Returns the external token.
    #[must_use]
    pub const fn token(&self) -> TaskToken {
        self.token
    }

    /// Returns the initiating principal.
    #[must_use]
    pub const fn initiator(&self) -> PrincipalId {
        self.initiator
    }

    /// Returns the source A selector.
    #[must_use]
    pub const fn source_a(&self) -> &SourceSelector {
        &self.source_a
    }

    /// Returns the source B selector.
    #[must_use]
    pub const fn source_b(&self) -> &SourceSelector {
        &self.source_b
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Field delta applied to a task in one atomic store update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskTransition {
    /// `PENDING -> QUEUED`.
    Enqueue {
        /// Progress message shown while waiting.
        message: String,
    },
    /// `PENDING | QUEUED -> RUNNING` once the lock is held.
    Start {
        /// Start timestamp, kept only on the first start.
        at: DateTime<Utc>,
        /// Progress message.
        message: String,
    },
    /// `RUNNING -> RUNNING` when a new stage begins.
    EnterStage {
        /// Stage being entered.
        stage: StageName,
        /// Stage checkpoint.
        progress: Progress,
        /// Stage-specific message.
        message: String,
    },
    /// Records the revision a fetch stage resolved.
    RecordRevision {
        /// Source the revision belongs to.
        slot: SourceSlot,
        /// Revision identifier.
        revision: String,
    },
    /// Records a finished stage's duration.
    RecordStageDuration {
        /// Target duration field.
        field: DurationField,
        /// Elapsed milliseconds.
        millis: i64,
    },
    /// `RUNNING -> SUCCESS`.
    Succeed {
        /// Completion timestamp.
        at: DateTime<Utc>,
        /// Final progress message.
        message: String,
    },
    /// `PENDING | QUEUED | RUNNING -> FAILED`.
    Fail {
        /// Completion timestamp.
        at: DateTime<Utc>,
        /// Failure cause, kept only if no earlier cause exists.
        cause: String,
    },
    /// `PENDING | QUEUED | RUNNING -> CANCELLED`.
    Cancel {
        /// Completion timestamp.
        at: DateTime<Utc>,
        /// Cancellation reason, kept only if no earlier cause exists.
        reason: String,
    },
}

impl TaskTransition {
    /// Returns the status the task holds after this transition.
    #[must_use]
    pub const fn target_status(&self) -> TaskStatus {
        match self {
            Self::Enqueue { .. } => TaskStatus::Queued,
            Self::Start { .. }
            | Self::EnterStage { .. }
            | Self::RecordRevision { .. }
            | Self::RecordStageDuration { .. } => TaskStatus::Running,
            Self::Succeed { .. } => TaskStatus::Success,
            Self::Fail { .. } => TaskStatus::Failed,
            Self::Cancel { .. } => TaskStatus::Cancelled,
        }
    }
}

/// Build task aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTask {
    id: TaskId,
    token: TaskToken,
    initiator: PrincipalId,
    status: TaskStatus,
    current_stage: Option<StageName>,
    source_a: SourceSelector,
    source_b: SourceSelector,
    source_a_revision: Option<String>,
    source_b_revision: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    stage_durations: StageDurations,
    total_duration_ms: Option<i64>,
    progress: Progress,
    progress_message: Option<String>,
    error_message: Option<String>,
}

/// Parameter object for reconstructing a persisted task aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedBuildTask {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted external token.
    pub token: TaskToken,
    /// Persisted initiating principal.
    pub initiator: PrincipalId,
    /// Persisted status.
    pub status: TaskStatus,
    /// Persisted current stage.
    pub current_stage: Option<StageName>,
    /// Persisted source A selector.
    pub source_a: SourceSelector,
    /// Persisted source B selector.
    pub source_b: SourceSelector,
    /// Persisted source A revision.
    pub source_a_revision: Option<String>,
    /// Persisted source B revision.
    pub source_b_revision: Option<String>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted start timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// Persisted completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Persisted per-stage durations.
    pub stage_durations: StageDurations,
    /// Persisted total duration in milliseconds.
    pub total_duration_ms: Option<i64>,
    /// Persisted progress.
    pub progress: Progress,
    /// Persisted progress message.
    pub progress_message: Option<String>,
    /// Persisted error message.
    pub error_message: Option<String>,
}

impl BuildTask {
    /// Materialises a freshly stored task in `PENDING`.
    #[must_use]
    pub fn create(id: TaskId, draft: NewBuildTask) -> Self {
        Self {
            id,
            token: draft.token,
            initiator: draft.initiator,
            status: TaskStatus::Pending,
            current_stage: None,
            source_a: draft.source_a,
            source_b: draft.source_b,
            source_a_revision: None,
            source_b_revision: None,
            created_at: draft.created_at,
            started_at: None,
            completed_at: None,
            stage_durations: StageDurations::default(),
            total_duration_ms: None,
            progress: Progress::ZERO,
            progress_message: Some("Task created".to_owned()),
            error_message: None,
        }
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedBuildTask) -> Self {
        Self {
            id: data.id,
            token: data.token,
            initiator: data.initiator,
            status: data.status,
            current_stage: data.current_stage,
            source_a: data.source_a,
            source_b: data.source_b,
            source_a_revision: data.source_a_revision,
            source_b_revision: data.source_b_revision,
            created_at: data.created_at,
            started_at: data.started_at,
            completed_at: data.completed_at,
            stage_durations: data.stage_durations,
            total_duration_ms: data.total_duration_ms,
            progress: data.progress,
            progress_message: data.progress_message,
            error_message: data.error_message,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the external token.
    #[must_use]
    pub const fn token(&self) -> TaskToken {
        self.token
    }

    /// Returns the initiating principal.
    #[must_use]
    pub const fn initiator(&self) -> PrincipalId {
        self.initiator
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the stage most recently entered, if any.
    #[must_use]
    pub const fn current_stage(&self) -> Option<StageName> {
        self.current_stage
    }

    /// Returns the selector for `slot`.
    #[must_use]
    pub const fn source(&self, slot: SourceSlot) -> &SourceSelector {
        match slot {
            SourceSlot::A => &self.source_a,
            SourceSlot::B => &self.source_b,
        }
    }

    /// Returns the branch requested for `slot`.
    #[must_use]
    pub const fn branch(&self, slot: SourceSlot) -> &BranchName {
        self.source(slot).branch()
    }

    /// Returns the revision a fetch stage resolved for `slot`.
    #[must_use]
    pub fn revision(&self, slot: SourceSlot) -> Option<&str> {
        match slot {
            SourceSlot::A => self.source_a_revision.as_deref(),
            SourceSlot::B => self.source_b_revision.as_deref(),
        }
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the first start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns the terminal transition timestamp.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the per-stage durations.
    #[must_use]
    pub const fn stage_durations(&self) -> &StageDurations {
        &self.stage_durations
    }

    /// Returns the total duration in milliseconds.
    #[must_use]
    pub const fn total_duration_ms(&self) -> Option<i64> {
        self.total_duration_ms
    }

    /// Returns the total duration, `completed_at - started_at`.
    #[must_use]
    pub fn total_duration(&self) -> Option<TimeDelta> {
        self.total_duration_ms.map(TimeDelta::milliseconds)
    }

    /// Returns the progress percentage.
    #[must_use]
    pub const fn progress(&self) -> Progress {
        self.progress
    }

    /// Returns the latest progress message.
    #[must_use]
    pub fn progress_message(&self) -> Option<&str> {
        self.progress_message.as_deref()
    }

    /// Returns the first recorded failure cause.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Applies a transition through the state machine.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::TaskFinished`] for terminal tasks,
    /// [`TaskDomainError::InvalidTransition`] when the transition is not
    /// legal from the current status, and
    /// [`TaskDomainError::ProgressRegression`] when a stage checkpoint would
    /// lower progress.
    pub fn apply(&mut self, transition: TaskTransition) -> Result<(), TaskDomainError> {
        let from = self.status;
        let to = transition.target_status();
        if from.is_terminal() {
            return Err(TaskDomainError::TaskFinished {
                task_id: self.id,
                status: from,
            });
        }

        let allowed = match &transition {
            TaskTransition::EnterStage { .. }
            | TaskTransition::RecordRevision { .. }
            | TaskTransition::RecordStageDuration { .. } => from == TaskStatus::Running,
            TaskTransition::Start { .. } => {
                from != TaskStatus::Running && from.can_transition_to(to)
            }
            _ => from.can_transition_to(to),
        };
        if !allowed {
            return Err(TaskDomainError::InvalidTransition {
                task_id: self.id,
                from,
                to,
            });
        }

        match transition {
            TaskTransition::Enqueue { message } => {
                self.status = TaskStatus::Queued;
                self.progress_message = Some(message);
            }
            TaskTransition::Start { at, message } => {
                self.status = TaskStatus::Running;
                self.started_at.get_or_insert(at);
                self.progress_message = Some(message);
            }
            TaskTransition::EnterStage {
                stage,
                progress,
                message,
            } => {
                if progress < self.progress {
                    return Err(TaskDomainError::ProgressRegression {
                        task_id: self.id,
                        current: self.progress.value(),
                        requested: progress.value(),
                    });
                }
                self.current_stage = Some(stage);
                self.progress = progress;
                self.progress_message = Some(message);
            }
            TaskTransition::RecordRevision { slot, revision } => match slot {
                SourceSlot::A => self.source_a_revision = Some(revision),
                SourceSlot::B => self.source_b_revision = Some(revision),
            },
            TaskTransition::RecordStageDuration { field, millis } => {
                self.stage_durations.set(field, millis);
            }
            TaskTransition::Succeed { at, message } => {
                self.progress = Progress::COMPLETE;
                self.progress_message = Some(message);
                self.finish(TaskStatus::Success, at);
            }
            TaskTransition::Fail { at, cause } => {
                self.error_message.get_or_insert(cause);
                self.finish(TaskStatus::Failed, at);
            }
            TaskTransition::Cancel { at, reason } => {
                self.error_message.get_or_insert(reason);
                self.finish(TaskStatus::Cancelled, at);
            }
        }
        Ok(())
    }

    /// Sets the terminal status, `completed_at` and `total_duration`.
    fn finish(&mut self, status: TaskStatus, at: DateTime<Utc>) {
        let completed_at = self.started_at.map_or(at, |started| at.max(started));
        self.status = status;
        self.completed_at = Some(completed_at);
        self.total_duration_ms = self
            .started_at
            .map(|started| (completed_at - started).num_milliseconds());
    }
}
