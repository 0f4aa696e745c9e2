//! In-memory lease lock for single-node deployments and tests.

use async_trait::async_trait;
use chrono::TimeDelta;
use mockable::{Clock, DefaultClock};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::build::{
    domain::TaskId,
    ports::{BuildLock, BuildLockError, BuildLockResult, LockLease},
};

/// Mutex-guarded lease record judged against an injected clock.
pub struct InMemoryBuildLock<C = DefaultClock> {
    lease: Arc<Mutex<Option<LockLease>>>,
    clock: Arc<C>,
}

impl<C> Clone for InMemoryBuildLock<C> {
    fn clone(&self) -> Self {
        Self {
            lease: Arc::clone(&self.lease),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl InMemoryBuildLock<DefaultClock> {
    /// Creates a free lock using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(DefaultClock))
    }
}

impl Default for InMemoryBuildLock<DefaultClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> InMemoryBuildLock<C>
where
    C: Clock + Send + Sync,
{
    /// Creates a free lock judging expiry with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<C>) -> Self {
        Self {
            lease: Arc::new(Mutex::new(None)),
            clock,
        }
    }

    fn guard(&self) -> BuildLockResult<std::sync::MutexGuard<'_, Option<LockLease>>> {
        self.lease
            .lock()
            .map_err(|err| BuildLockError::backend(std::io::Error::other(err.to_string())))
    }

    /// Drops the record if its lease has run out and returns what is left.
    fn live_lease(&self, slot: &mut Option<LockLease>) -> Option<LockLease> {
        let now = self.clock.utc();
        if slot.is_some_and(|lease| lease.expires_at <= now) {
            *slot = None;
        }
        *slot
    }
}

#[async_trait]
impl<C> BuildLock for InMemoryBuildLock<C>
where
    C: Clock + Send + Sync,
{
    async fn acquire(&self, owner: TaskId, lease: Duration) -> BuildLockResult<bool> {
        let ttl = TimeDelta::from_std(lease).map_err(|_| BuildLockError::InvalidLease(lease))?;
        let mut slot = self.guard()?;
        if let Some(current) = self.live_lease(&mut slot) {
            debug!(owner = %owner, holder = %current.owner, "build lock contended");
            return Ok(false);
        }

        *slot = Some(LockLease {
            owner,
            expires_at: self.clock.utc() + ttl,
        });
        info!(owner = %owner, "build lock acquired");
        Ok(true)
    }

    async fn release(&self, owner: TaskId) -> BuildLockResult<bool> {
        let mut slot = self.guard()?;
        match self.live_lease(&mut slot) {
            Some(current) if current.owner == owner => {
                *slot = None;
                info!(owner = %owner, "build lock released");
                Ok(true)
            }
            _ => {
                debug!(owner = %owner, "build lock not held by owner; release ignored");
                Ok(false)
            }
        }
    }

    async fn holder(&self) -> BuildLockResult<Option<LockLease>> {
        let mut slot = self.guard()?;
        Ok(self.live_lease(&mut slot))
    }
}
