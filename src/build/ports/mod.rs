//! Port contracts for build orchestration.
//!
//! Ports define infrastructure-agnostic interfaces used by the build
//! services.

pub mod events;
pub mod lock;
pub mod runner;
pub mod store;
pub mod vault;

pub use events::EventSink;
pub use lock::{BuildLock, BuildLockError, BuildLockResult, LockLease};
pub use runner::{
    CommandRunner, CommandRunnerError, CommandRunnerResult, CommandSpec, ExitStatus, OutputLine,
    OutputStream, RunningCommand,
};
pub use store::{BuildStore, BuildStoreError, BuildStoreResult, SortOrder, TaskQuery};
pub use vault::{ArtifactVault, ArtifactVaultError, ArtifactVaultResult};
