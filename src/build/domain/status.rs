//! Task status and pipeline stage vocabularies.

use super::{ParseStageNameError, ParseTaskStatusError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a build task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has been created but not yet handed to the executor.
    Pending,
    /// Task is waiting for the global build lock.
    Queued,
    /// Task holds the lock and its pipeline is executing.
    Running,
    /// Every pipeline stage completed.
    Success,
    /// A stage or the executor itself failed.
    Failed,
    /// Task was cancelled on request.
    Cancelled,
}

impl TaskStatus {
    /// Statuses that count against the single-flight invariant.
    pub const ACTIVE: [Self; 2] = [Self::Queued, Self::Running];

    /// Statuses a restart leaves behind without an owning executor.
    pub const UNFINISHED: [Self; 3] = [Self::Pending, Self::Queued, Self::Running];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` for statuses that permit no further mutation.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` for statuses counted as the active task.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Returns whether the state machine permits moving to `target`.
    ///
    /// `Running -> Running` is permitted for stage changes.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        match self {
            Self::Pending => matches!(
                target,
                Self::Queued | Self::Running | Self::Failed | Self::Cancelled
            ),
            Self::Queued => matches!(target, Self::Running | Self::Failed | Self::Cancelled),
            Self::Running => matches!(
                target,
                Self::Running | Self::Success | Self::Failed | Self::Cancelled
            ),
            Self::Success | Self::Failed | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseTaskStatusError(value.to_owned())),
        }
    }
}

/// One of the two source repositories a task builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSlot {
    /// The upstream source, built and exported first.
    A,
    /// The downstream source, built last and packaged.
    B,
}

impl SourceSlot {
    /// Returns the lowercase slot label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
        }
    }
}

/// Named unit of pipeline work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Synchronise the working tree of source A.
    FetchA,
    /// Run the native build of source A.
    BuildA,
    /// Synchronise the working tree of source B.
    FetchB,
    /// Run the native build of source B.
    BuildB,
    /// Copy, hash and record the build output.
    Package,
}

impl StageName {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FetchA => "fetch_a",
            Self::BuildA => "build_a",
            Self::FetchB => "fetch_b",
            Self::BuildB => "build_b",
            Self::Package => "package",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for StageName {
    type Error = ParseStageNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fetch_a" => Ok(Self::FetchA),
            "build_a" => Ok(Self::BuildA),
            "fetch_b" => Ok(Self::FetchB),
            "build_b" => Ok(Self::BuildB),
            "package" => Ok(Self::Package),
            _ => Err(ParseStageNameError(value.to_owned())),
        }
    }
}
