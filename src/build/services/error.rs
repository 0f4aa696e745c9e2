//! Service-level error types.

use crate::build::domain::{StageName, TaskDomainError, TaskId, TaskStatus};
use crate::build::ports::{ArtifactVaultError, BuildLockError, BuildStoreError, CommandRunnerError};
use thiserror::Error;

/// Errors returned by the engine facade and its services.
#[derive(Debug, Clone, Error)]
pub enum BuildEngineError {
    /// Another task is queued or running.
    #[error("a build is already in progress (task {active})")]
    Contention {
        /// Task currently occupying the engine.
        active: TaskId,
    },

    /// The task does not exist.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The task already reached a terminal status.
    #[error("task {task_id} already finished with status {status}")]
    AlreadyFinished {
        /// Task identifier.
        task_id: TaskId,
        /// Terminal status.
        status: TaskStatus,
    },

    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),

    /// The state store failed.
    #[error(transparent)]
    Store(#[from] BuildStoreError),

    /// The build lock failed.
    #[error(transparent)]
    Lock(#[from] BuildLockError),
}

/// Result type for engine operations.
pub type BuildEngineResult<T> = Result<T, BuildEngineError>;

/// Failure of one stage body. Never escapes the pipeline executor.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// An external command exited unsuccessfully.
    #[error("'{program}' failed with {status}")]
    NonZeroExit {
        /// Program that failed.
        program: String,
        /// Rendered exit status.
        status: String,
    },

    /// The expected output file is missing.
    #[error("expected output file not found: {0}")]
    MissingOutput(String),

    /// A command could not be started or observed.
    #[error(transparent)]
    Runner(#[from] CommandRunnerError),

    /// Artifact storage failed.
    #[error(transparent)]
    Vault(ArtifactVaultError),

    /// The state store failed mid-stage.
    #[error(transparent)]
    Store(#[from] BuildStoreError),

    /// A build command template failed to render.
    #[error("failed to render command template '{template}': {reason}")]
    Template {
        /// Offending template.
        template: String,
        /// Renderer message.
        reason: String,
    },

    /// The run was cancelled while the stage was in flight.
    #[error("stage {0} cancelled")]
    Cancelled(StageName),
}

impl From<ArtifactVaultError> for StageError {
    fn from(err: ArtifactVaultError) -> Self {
        match err {
            ArtifactVaultError::SourceMissing(path) => Self::MissingOutput(path.into_string()),
            other @ ArtifactVaultError::Io(_) => Self::Vault(other),
        }
    }
}
