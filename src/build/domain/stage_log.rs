//! Per-stage attempt records.

use super::{StageLogId, StageName, TaskDomainError, TaskId};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Payload opening a stage log at stage start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStageLog {
    /// Owning task.
    pub task_id: TaskId,
    /// Stage being attempted.
    pub stage: StageName,
    /// Stage start timestamp.
    pub started_at: DateTime<Utc>,
}

/// Outcome written to a stage log when the stage ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLogClosure {
    completed_at: DateTime<Utc>,
    success: bool,
    log_content: String,
    error_message: Option<String>,
}

impl StageLogClosure {
    /// Closure for a stage that completed.
    #[must_use]
    pub const fn succeeded(completed_at: DateTime<Utc>, log_content: String) -> Self {
        Self {
            completed_at,
            success: true,
            log_content,
            error_message: None,
        }
    }

    /// Closure for a stage that failed with `error`.
    #[must_use]
    pub const fn failed(completed_at: DateTime<Utc>, log_content: String, error: String) -> Self {
        Self {
            completed_at,
            success: false,
            log_content,
            error_message: Some(error),
        }
    }

    /// Returns the end timestamp.
    #[must_use]
    pub const fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Returns whether the stage succeeded.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }
}

/// One record per stage attempt of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLog {
    id: StageLogId,
    task_id: TaskId,
    stage: StageName,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    success: Option<bool>,
    log_content: Option<String>,
    error_message: Option<String>,
}

/// Parameter object for reconstructing a persisted stage log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedStageLog {
    /// Persisted identifier.
    pub id: StageLogId,
    /// Persisted owning task.
    pub task_id: TaskId,
    /// Persisted stage.
    pub stage: StageName,
    /// Persisted start timestamp.
    pub started_at: DateTime<Utc>,
    /// Persisted end timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Persisted outcome.
    pub success: Option<bool>,
    /// Persisted captured output.
    pub log_content: Option<String>,
    /// Persisted error text.
    pub error_message: Option<String>,
}

impl StageLog {
    /// Materialises a freshly opened stage log.
    #[must_use]
    pub fn open(id: StageLogId, new: NewStageLog) -> Self {
        Self {
            id,
            task_id: new.task_id,
            stage: new.stage,
            started_at: new.started_at,
            completed_at: None,
            success: None,
            log_content: None,
            error_message: None,
        }
    }

    /// Reconstructs a stage log from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedStageLog) -> Self {
        Self {
            id: data.id,
            task_id: data.task_id,
            stage: data.stage,
            started_at: data.started_at,
            completed_at: data.completed_at,
            success: data.success,
            log_content: data.log_content,
            error_message: data.error_message,
        }
    }

    /// Finalises the record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::StageLogClosed`] when the log was already
    /// finalised.
    pub fn close(&mut self, closure: StageLogClosure) -> Result<(), TaskDomainError> {
        if self.is_closed() {
            return Err(TaskDomainError::StageLogClosed(self.id));
        }
        self.completed_at = Some(closure.completed_at.max(self.started_at));
        self.success = Some(closure.success);
        self.log_content = Some(closure.log_content);
        self.error_message = closure.error_message;
        Ok(())
    }

    /// Returns the record identifier.
    #[must_use]
    pub const fn id(&self) -> StageLogId {
        self.id
    }

    /// Returns the owning task.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the stage.
    #[must_use]
    pub const fn stage(&self) -> StageName {
        self.stage
    }

    /// Returns the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the end timestamp once closed.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the outcome once closed.
    #[must_use]
    pub const fn success(&self) -> Option<bool> {
        self.success
    }

    /// Returns the captured output once closed.
    #[must_use]
    pub fn log_content(&self) -> Option<&str> {
        self.log_content.as_deref()
    }

    /// Returns the failure text, if the stage failed.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns `true` once the record has been finalised.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Returns the elapsed stage time once closed.
    #[must_use]
    pub fn duration(&self) -> Option<TimeDelta> {
        self.completed_at.map(|end| end - self.started_at)
    }
}
