//! `PostgreSQL` lease lock shared across processes.

use super::{
    BuildPgPool,
    models::{LockRow, row_to_lease},
    schema::build_lock,
};
use crate::build::{
    domain::TaskId,
    ports::{BuildLock, BuildLockError, BuildLockResult, LockLease},
};
use async_trait::async_trait;
use chrono::TimeDelta;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text, Timestamptz};
use mockable::{Clock, DefaultClock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Name of the row backing the global build lock.
pub const BUILD_LOCK_NAME: &str = "build";

/// Lease lock stored as a single row keyed by name.
///
/// Acquisition is one conditional upsert: it inserts the row or takes over
/// an expired lease, and affects no row while a live lease exists.
pub struct PostgresBuildLock<C = DefaultClock> {
    pool: BuildPgPool,
    clock: Arc<C>,
    name: String,
}

impl<C> Clone for PostgresBuildLock<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            clock: Arc::clone(&self.clock),
            name: self.name.clone(),
        }
    }
}

impl PostgresBuildLock<DefaultClock> {
    /// Creates a lock on the default row using the system clock.
    #[must_use]
    pub fn new(pool: BuildPgPool) -> Self {
        Self::with_clock(pool, Arc::new(DefaultClock))
    }
}

impl<C> PostgresBuildLock<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates a lock on the default row judging expiry with `clock`.
    #[must_use]
    pub fn with_clock(pool: BuildPgPool, clock: Arc<C>) -> Self {
        Self {
            pool,
            clock,
            name: BUILD_LOCK_NAME.to_owned(),
        }
    }

    async fn run_blocking<F, T>(&self, f: F) -> BuildLockResult<T>
    where
        F: FnOnce(&mut PgConnection, &str) -> BuildLockResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        let name = self.name.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(BuildLockError::backend)?;
            f(&mut connection, &name)
        })
        .await
        .map_err(BuildLockError::backend)?
    }
}

#[async_trait]
impl<C> BuildLock for PostgresBuildLock<C>
where
    C: Clock + Send + Sync + 'static,
{
    async fn acquire(&self, owner: TaskId, lease: Duration) -> BuildLockResult<bool> {
        let ttl = TimeDelta::from_std(lease).map_err(|_| BuildLockError::InvalidLease(lease))?;
        let now = self.clock.utc();
        let expires_at = now + ttl;
        let acquired = self
            .run_blocking(move |connection, name| {
                let affected = diesel::sql_query(concat!(
                    "INSERT INTO build_lock (name, owner, expires_at) VALUES ($1, $2, $3) ",
                    "ON CONFLICT (name) DO UPDATE ",
                    "SET owner = EXCLUDED.owner, expires_at = EXCLUDED.expires_at ",
                    "WHERE build_lock.expires_at <= $4",
                ))
                .bind::<Text, _>(name)
                .bind::<BigInt, _>(owner.value())
                .bind::<Timestamptz, _>(expires_at)
                .bind::<Timestamptz, _>(now)
                .execute(connection)
                .map_err(BuildLockError::backend)?;
                Ok(affected == 1)
            })
            .await?;
        if acquired {
            info!(owner = %owner, "build lock acquired");
        } else {
            debug!(owner = %owner, "build lock contended");
        }
        Ok(acquired)
    }

    async fn release(&self, owner: TaskId) -> BuildLockResult<bool> {
        let now = self.clock.utc();
        let released = self
            .run_blocking(move |connection, name| {
                let affected = diesel::delete(
                    build_lock::table
                        .filter(build_lock::name.eq(name))
                        .filter(build_lock::owner.eq(owner.value()))
                        .filter(build_lock::expires_at.gt(now)),
                )
                .execute(connection)
                .map_err(BuildLockError::backend)?;
                Ok(affected == 1)
            })
            .await?;
        if released {
            info!(owner = %owner, "build lock released");
        } else {
            debug!(owner = %owner, "build lock not held by owner; release ignored");
        }
        Ok(released)
    }

    async fn holder(&self) -> BuildLockResult<Option<LockLease>> {
        let now = self.clock.utc();
        self.run_blocking(move |connection, name| {
            let row = build_lock::table
                .filter(build_lock::name.eq(name))
                .filter(build_lock::expires_at.gt(now))
                .select(LockRow::as_select())
                .first::<LockRow>(connection)
                .optional()
                .map_err(BuildLockError::backend)?;
            Ok(row.as_ref().and_then(row_to_lease))
        })
        .await
    }
}
