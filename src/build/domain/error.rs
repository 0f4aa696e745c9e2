//! Error types for build domain validation and state transitions.

use super::{StageLogId, TaskId, TaskStatus};
use thiserror::Error;

/// Errors returned while constructing or mutating build domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// Task identifiers are positive integers.
    #[error("invalid task id {0}, expected a positive integer")]
    InvalidTaskId(i64),

    /// Principal identifiers are positive integers.
    #[error("invalid principal id {0}, expected a positive integer")]
    InvalidPrincipalId(i64),

    /// A source branch selector is empty after trimming.
    #[error("branch name must not be empty")]
    EmptyBranch,

    /// Progress values are percentages.
    #[error("invalid progress {0}, expected 0..=100")]
    InvalidProgress(u8),

    /// The artifact checksum is not a 64-character hex SHA-256 digest.
    #[error("invalid checksum '{0}', expected 64 lowercase hex characters")]
    InvalidChecksum(String),

    /// The task is terminal and accepts no further mutation.
    #[error("task {task_id} is already {status} and cannot change")]
    TaskFinished {
        /// Task identifier.
        task_id: TaskId,
        /// Terminal status the task holds.
        status: TaskStatus,
    },

    /// The requested status change is not part of the state machine.
    #[error("invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        /// Task identifier.
        task_id: TaskId,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },

    /// Progress may not decrease within a run.
    #[error("progress for task {task_id} cannot move from {current} to {requested}")]
    ProgressRegression {
        /// Task identifier.
        task_id: TaskId,
        /// Current progress.
        current: u8,
        /// Requested progress.
        requested: u8,
    },

    /// A stage log record was already finalised.
    #[error("stage log {0} is already closed")]
    StageLogClosed(StageLogId),
}

/// Error returned while parsing task statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);

/// Error returned while parsing stage names from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown stage name: {0}")]
pub struct ParseStageNameError(pub String);
