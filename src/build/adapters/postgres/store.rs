//! `PostgreSQL` state store.

use super::{
    BuildPgPool,
    models::{
        ArtifactRow, StageLogRow, TaskRow, artifact_to_row, row_to_artifact, row_to_stage_log,
        row_to_task, stage_log_to_row, task_changeset, task_to_row,
    },
    schema::{build_artifacts, build_stage_logs, build_tasks},
};
use crate::build::{
    domain::{
        Artifact, ArtifactId, BuildTask, NewArtifact, NewBuildTask, NewStageLog, StageLog,
        StageLogClosure, StageLogId, TaskId, TaskToken, TaskTransition,
    },
    ports::{BuildStore, BuildStoreError, BuildStoreResult, SortOrder, TaskQuery},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Text};

/// `PostgreSQL`-backed build store.
///
/// Transitions run inside a transaction holding a row lock on the task, so
/// concurrent updates to one task serialise.
#[derive(Debug, Clone)]
pub struct PostgresBuildStore {
    pool: BuildPgPool,
}

impl PostgresBuildStore {
    /// Creates a store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: BuildPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> BuildStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> BuildStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(BuildStoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(BuildStoreError::persistence)?
    }
}

/// Error carried out of a Diesel transaction closure.
#[derive(Debug)]
enum TxError {
    Store(BuildStoreError),
    Database(DieselError),
}

impl From<DieselError> for TxError {
    fn from(err: DieselError) -> Self {
        Self::Database(err)
    }
}

impl From<BuildStoreError> for TxError {
    fn from(err: BuildStoreError) -> Self {
        Self::Store(err)
    }
}

impl From<TxError> for BuildStoreError {
    fn from(err: TxError) -> Self {
        match err {
            TxError::Store(store) => store,
            TxError::Database(database) => Self::persistence(database),
        }
    }
}

#[derive(QueryableByName)]
struct NextId {
    #[diesel(sql_type = BigInt)]
    id: i64,
}

fn next_id(connection: &mut PgConnection, table: &str) -> BuildStoreResult<i64> {
    diesel::sql_query("SELECT nextval(pg_get_serial_sequence($1, 'id')) AS id")
        .bind::<Text, _>(table)
        .get_result::<NextId>(connection)
        .map(|row| row.id)
        .map_err(BuildStoreError::persistence)
}

fn task_exists(connection: &mut PgConnection, id: TaskId) -> BuildStoreResult<bool> {
    let count: i64 = build_tasks::table
        .filter(build_tasks::id.eq(id.value()))
        .count()
        .get_result(connection)
        .map_err(BuildStoreError::persistence)?;
    Ok(count > 0)
}

fn to_offset(value: usize) -> BuildStoreResult<i64> {
    i64::try_from(value).map_err(BuildStoreError::persistence)
}

#[async_trait]
impl BuildStore for PostgresBuildStore {
    async fn create_task(&self, draft: NewBuildTask) -> BuildStoreResult<BuildTask> {
        let token = draft.token();
        self.run_blocking(move |connection| {
            let id = TaskId::new(next_id(connection, "build_tasks")?)?;
            let task = BuildTask::create(id, draft);
            let row = task_to_row(&task)?;
            diesel::insert_into(build_tasks::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        BuildStoreError::DuplicateToken(token)
                    }
                    _ => BuildStoreError::persistence(err),
                })?;
            Ok(task)
        })
        .await
    }

    async fn find_task(&self, id: TaskId) -> BuildStoreResult<Option<BuildTask>> {
        self.run_blocking(move |connection| {
            let row = build_tasks::table
                .filter(build_tasks::id.eq(id.value()))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()
                .map_err(BuildStoreError::persistence)?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn find_task_by_token(&self, token: TaskToken) -> BuildStoreResult<Option<BuildTask>> {
        self.run_blocking(move |connection| {
            let row = build_tasks::table
                .filter(build_tasks::token.eq(token.into_inner()))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()
                .map_err(BuildStoreError::persistence)?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn update_task(
        &self,
        id: TaskId,
        transition: TaskTransition,
    ) -> BuildStoreResult<BuildTask> {
        self.run_blocking(move |connection| {
            connection
                .transaction::<_, TxError, _>(|tx| {
                    let row = build_tasks::table
                        .filter(build_tasks::id.eq(id.value()))
                        .select(TaskRow::as_select())
                        .for_update()
                        .first::<TaskRow>(tx)
                        .optional()?
                        .ok_or(BuildStoreError::TaskNotFound(id))?;
                    let mut task = row_to_task(row)?;
                    task.apply(transition).map_err(BuildStoreError::from)?;
                    diesel::update(build_tasks::table.filter(build_tasks::id.eq(id.value())))
                        .set(&task_changeset(&task))
                        .execute(tx)?;
                    Ok(task)
                })
                .map_err(BuildStoreError::from)
        })
        .await
    }

    async fn query_tasks(&self, query: &TaskQuery) -> BuildStoreResult<Vec<BuildTask>> {
        let statuses: Vec<String> = query
            .statuses()
            .iter()
            .map(|status| status.as_str().to_owned())
            .collect();
        let initiator = query.initiator().map(|principal| principal.value());
        let order = query.order();
        let offset = to_offset(query.skip())?;
        let limit = query.take().map(to_offset).transpose()?;

        self.run_blocking(move |connection| {
            let mut statement = build_tasks::table
                .select(TaskRow::as_select())
                .into_boxed();
            if !statuses.is_empty() {
                statement = statement.filter(build_tasks::status.eq_any(statuses));
            }
            if let Some(principal) = initiator {
                statement = statement.filter(build_tasks::initiator.eq(principal));
            }
            statement = match order {
                SortOrder::NewestFirst => {
                    statement.order((build_tasks::created_at.desc(), build_tasks::id.desc()))
                }
                SortOrder::OldestFirst => {
                    statement.order((build_tasks::created_at.asc(), build_tasks::id.asc()))
                }
            };
            statement = statement.offset(offset);
            if let Some(page) = limit {
                statement = statement.limit(page);
            }
            let rows = statement
                .load::<TaskRow>(connection)
                .map_err(BuildStoreError::persistence)?;
            rows.into_iter().map(row_to_task).collect()
        })
        .await
    }

    async fn open_stage_log(&self, new: NewStageLog) -> BuildStoreResult<StageLog> {
        self.run_blocking(move |connection| {
            if !task_exists(connection, new.task_id)? {
                return Err(BuildStoreError::TaskNotFound(new.task_id));
            }
            let id = StageLogId::from_raw(next_id(connection, "build_stage_logs")?);
            let log = StageLog::open(id, new);
            diesel::insert_into(build_stage_logs::table)
                .values(&stage_log_to_row(&log))
                .execute(connection)
                .map_err(BuildStoreError::persistence)?;
            Ok(log)
        })
        .await
    }

    async fn close_stage_log(
        &self,
        id: StageLogId,
        closure: StageLogClosure,
    ) -> BuildStoreResult<StageLog> {
        self.run_blocking(move |connection| {
            connection
                .transaction::<_, TxError, _>(|tx| {
                    let row = build_stage_logs::table
                        .filter(build_stage_logs::id.eq(id.value()))
                        .select(StageLogRow::as_select())
                        .for_update()
                        .first::<StageLogRow>(tx)
                        .optional()?
                        .ok_or(BuildStoreError::StageLogNotFound(id))?;
                    let mut log = row_to_stage_log(row)?;
                    log.close(closure).map_err(BuildStoreError::from)?;
                    let closed = stage_log_to_row(&log);
                    let target =
                        build_stage_logs::table.filter(build_stage_logs::id.eq(id.value()));
                    diesel::update(target)
                        .set((
                            build_stage_logs::completed_at.eq(closed.completed_at),
                            build_stage_logs::success.eq(closed.success),
                            build_stage_logs::log_content.eq(closed.log_content),
                            build_stage_logs::error_message.eq(closed.error_message),
                        ))
                        .execute(tx)?;
                    Ok(log)
                })
                .map_err(BuildStoreError::from)
        })
        .await
    }

    async fn stage_logs(&self, task_id: TaskId) -> BuildStoreResult<Vec<StageLog>> {
        self.run_blocking(move |connection| {
            let rows = build_stage_logs::table
                .filter(build_stage_logs::task_id.eq(task_id.value()))
                .order((build_stage_logs::started_at.asc(), build_stage_logs::id.asc()))
                .select(StageLogRow::as_select())
                .load::<StageLogRow>(connection)
                .map_err(BuildStoreError::persistence)?;
            rows.into_iter().map(row_to_stage_log).collect()
        })
        .await
    }

    async fn create_artifact(&self, new: NewArtifact) -> BuildStoreResult<Artifact> {
        self.run_blocking(move |connection| {
            let task_id = new.task_id;
            if !task_exists(connection, task_id)? {
                return Err(BuildStoreError::TaskNotFound(task_id));
            }
            let id = ArtifactId::from_raw(next_id(connection, "build_artifacts")?);
            let artifact = Artifact::create(id, new);
            diesel::insert_into(build_artifacts::table)
                .values(&artifact_to_row(&artifact)?)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        BuildStoreError::DuplicateArtifact(task_id)
                    }
                    _ => BuildStoreError::persistence(err),
                })?;
            Ok(artifact)
        })
        .await
    }

    async fn find_artifact(&self, task_id: TaskId) -> BuildStoreResult<Option<Artifact>> {
        self.run_blocking(move |connection| {
            let row = build_artifacts::table
                .filter(build_artifacts::task_id.eq(task_id.value()))
                .select(ArtifactRow::as_select())
                .first::<ArtifactRow>(connection)
                .optional()
                .map_err(BuildStoreError::persistence)?;
            row.map(row_to_artifact).transpose()
        })
        .await
    }
}
