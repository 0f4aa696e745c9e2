//! Domain model for single-flight build orchestration.
//!
//! The domain holds the task state machine, stage and artifact records and
//! the notification vocabulary. It performs no I/O; stores, locks, command
//! runners and event sinks live behind the ports in [`crate::build::ports`].

mod artifact;
mod error;
mod event;
mod ids;
mod progress;
mod source;
mod stage_log;
mod status;
mod task;

pub use artifact::{Artifact, Checksum, NewArtifact, PersistedArtifact, StoredFile};
pub use error::{ParseStageNameError, ParseTaskStatusError, TaskDomainError};
pub use event::{LogLine, TaskPhase, TaskUpdate};
pub use ids::{ArtifactId, PrincipalId, StageLogId, TaskId, TaskToken};
pub use progress::Progress;
pub use source::{BranchName, SourceSelector, render_arg_value};
pub use stage_log::{NewStageLog, PersistedStageLog, StageLog, StageLogClosure};
pub use status::{SourceSlot, StageName, TaskStatus};
pub use task::{
    BuildTask, DurationField, NewBuildTask, PersistedBuildTask, StageDurations, TaskTransition,
};
