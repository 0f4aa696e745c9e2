//! Global build lock port.

use crate::build::domain::TaskId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for build lock operations.
pub type BuildLockResult<T> = Result<T, BuildLockError>;

/// Current grant of the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockLease {
    /// Task holding the lock.
    pub owner: TaskId,
    /// Instant after which the lock is implicitly free.
    pub expires_at: DateTime<Utc>,
}

/// Lease-based mutual exclusion across processes.
///
/// At most one owner holds the lock at a time. An expired lease counts as
/// free so a crashed holder cannot block builds forever. The lock does not
/// queue waiters.
#[async_trait]
pub trait BuildLock: Send + Sync {
    /// Takes the lock for `owner` if it is free or expired.
    ///
    /// Returns whether `owner` now holds the lock.
    async fn acquire(&self, owner: TaskId, lease: Duration) -> BuildLockResult<bool>;

    /// Clears the lock if `owner` holds it.
    ///
    /// Returns `false` without touching the lock when another owner, or
    /// nobody, holds it.
    async fn release(&self, owner: TaskId) -> BuildLockResult<bool>;

    /// Returns the live lease, or `None` when the lock is free or expired.
    async fn holder(&self) -> BuildLockResult<Option<LockLease>>;
}

/// Errors returned by build lock implementations.
#[derive(Debug, Clone, Error)]
pub enum BuildLockError {
    /// The lease duration cannot be represented.
    #[error("invalid lease duration: {0:?}")]
    InvalidLease(Duration),

    /// Backend failure.
    #[error("lock backend error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl BuildLockError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
