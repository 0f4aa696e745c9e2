//! Orchestration services for the build engine.
//!
//! [`BuildEngine`] is the entry point: it admits one task at a time, hands
//! it to the [`PipelineExecutor`] and tracks the run so it can be cancelled
//! or awaited.

mod cancellation;
mod capture;
mod engine;
mod error;
mod pipeline;
mod queue;
mod stages;
mod state_machine;

pub use cancellation::CancellationToken;
pub use capture::LogCapture;
pub use engine::{BuildEngine, RECOVERY_MESSAGE, SubmitBuildRequest};
pub use error::{BuildEngineError, BuildEngineResult, StageError};
pub use pipeline::{BuildPorts, PipelineExecutor, RunOutcome};
pub use queue::{PollerHandle, QueueDispatcher, QueuePoller, TaskQueue};
pub use stages::{PIPELINE, StageBody, StageDescriptor};
pub use state_machine::{
    CANCELLED_MESSAGE, COMPLETED_MESSAGE, QUEUED_MESSAGE, STARTED_MESSAGE, TaskStateMachine,
};
