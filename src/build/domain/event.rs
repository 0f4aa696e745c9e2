//! Progress and log notifications emitted to observers.

use super::{BuildTask, Progress, StageName, TaskId, TaskStatus, TaskToken};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase announced by a task update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    /// Task record created.
    Created,
    /// Task waiting for the lock.
    Queued,
    /// Task acquired the lock and began running.
    Started,
    /// Task entered a new stage.
    Progress,
    /// Task finished successfully.
    Completed,
    /// Task failed.
    Failed,
    /// Task was cancelled.
    Cancelled,
}

impl TaskPhase {
    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Queued => "queued",
            Self::Started => "started",
            Self::Progress => "progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Lifecycle notification keyed by task token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdate {
    /// External task token.
    pub token: TaskToken,
    /// Internal task identifier.
    pub task_id: TaskId,
    /// Announced phase.
    pub phase: TaskPhase,
    /// Status after the transition.
    pub status: TaskStatus,
    /// Stage the task is in, if any.
    pub stage: Option<StageName>,
    /// Progress after the transition.
    pub progress: Progress,
    /// Human-readable message.
    pub message: Option<String>,
    /// Outcome flag, set on final notifications only.
    pub success: Option<bool>,
}

impl TaskUpdate {
    /// Builds an update snapshotting `task`.
    #[must_use]
    pub fn from_task(task: &BuildTask, phase: TaskPhase) -> Self {
        Self {
            token: task.token(),
            task_id: task.id(),
            phase,
            status: task.status(),
            stage: task.current_stage(),
            progress: task.progress(),
            message: task.progress_message().map(str::to_owned),
            success: None,
        }
    }

    /// Marks the update as a final notification carrying the outcome.
    #[must_use]
    pub const fn with_outcome(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }
}

/// One streamed output line of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// External task token.
    pub token: TaskToken,
    /// Stage that produced the line.
    pub stage: StageName,
    /// Line text without the trailing newline.
    pub text: String,
    /// Emission timestamp.
    pub at: DateTime<Utc>,
}
