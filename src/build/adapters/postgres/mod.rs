//! `PostgreSQL` adapters for build persistence and the global lock.

mod lock;
mod models;
mod schema;
mod store;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

/// `PostgreSQL` connection pool type used by build adapters.
pub type BuildPgPool = Pool<ConnectionManager<PgConnection>>;

pub use lock::{BUILD_LOCK_NAME, PostgresBuildLock};
pub use store::PostgresBuildStore;
