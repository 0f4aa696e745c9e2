//! Diesel row models and domain conversions for build persistence.

use super::schema::{build_artifacts, build_lock, build_stage_logs, build_tasks};
use crate::build::domain::{
    Artifact, ArtifactId, BuildTask, Checksum, DurationField, PersistedArtifact,
    PersistedBuildTask, PersistedStageLog, PrincipalId, Progress, SourceSelector, SourceSlot,
    StageDurations, StageLog, StageLogId, StageName, StoredFile, TaskId, TaskStatus, TaskToken,
};
use crate::build::ports::{BuildStoreError, BuildStoreResult, LockLease};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result and insert row for build tasks.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = build_tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    /// Store-assigned identifier.
    pub id: i64,
    /// External token.
    pub token: uuid::Uuid,
    /// Initiating principal.
    pub initiator: i64,
    /// Lifecycle status.
    pub status: String,
    /// Current stage.
    pub current_stage: Option<String>,
    /// Source A selector JSON.
    pub source_a: Value,
    /// Source B selector JSON.
    pub source_b: Value,
    /// Source A revision.
    pub source_a_revision: Option<String>,
    /// Source B revision.
    pub source_b_revision: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Start timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Fetch A duration.
    pub fetch_a_duration_ms: Option<i64>,
    /// Build A duration.
    pub build_a_duration_ms: Option<i64>,
    /// Fetch B duration.
    pub fetch_b_duration_ms: Option<i64>,
    /// Build B duration.
    pub build_b_duration_ms: Option<i64>,
    /// Total duration.
    pub total_duration_ms: Option<i64>,
    /// Progress percentage.
    pub progress: i16,
    /// Progress message.
    pub progress_message: Option<String>,
    /// Error message.
    pub error_message: Option<String>,
}

/// Mutable task columns written after a transition.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = build_tasks)]
#[diesel(treat_none_as_null = true)]
pub struct TaskChangeset {
    /// Lifecycle status.
    pub status: String,
    /// Current stage.
    pub current_stage: Option<String>,
    /// Source A revision.
    pub source_a_revision: Option<String>,
    /// Source B revision.
    pub source_b_revision: Option<String>,
    /// Start timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Fetch A duration.
    pub fetch_a_duration_ms: Option<i64>,
    /// Build A duration.
    pub build_a_duration_ms: Option<i64>,
    /// Fetch B duration.
    pub fetch_b_duration_ms: Option<i64>,
    /// Build B duration.
    pub build_b_duration_ms: Option<i64>,
    /// Total duration.
    pub total_duration_ms: Option<i64>,
    /// Progress percentage.
    pub progress: i16,
    /// Progress message.
    pub progress_message: Option<String>,
    /// Error message.
    pub error_message: Option<String>,
}

/// Query result and insert row for stage logs.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = build_stage_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StageLogRow {
    /// Store-assigned identifier.
    pub id: i64,
    /// Owning task.
    pub task_id: i64,
    /// Stage name.
    pub stage: String,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// End timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Outcome.
    pub success: Option<bool>,
    /// Captured output.
    pub log_content: Option<String>,
    /// Error text.
    pub error_message: Option<String>,
}

/// Query result and insert row for artifacts.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = build_artifacts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ArtifactRow {
    /// Store-assigned identifier.
    pub id: i64,
    /// Producing task.
    pub task_id: i64,
    /// Stored file name.
    pub file_name: String,
    /// Stored file path.
    pub file_path: String,
    /// Size in bytes.
    pub file_size: i64,
    /// Hex checksum.
    pub checksum: String,
    /// Download URL path.
    pub download_url: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Download counter.
    pub download_count: i64,
    /// Last download timestamp.
    pub last_downloaded_at: Option<DateTime<Utc>>,
    /// Archival flag.
    pub is_archived: bool,
    /// Archival timestamp.
    pub archived_at: Option<DateTime<Utc>>,
}

/// Query result and insert row for the lock lease.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = build_lock)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LockRow {
    /// Lock name.
    pub name: String,
    /// Holding task.
    pub owner: i64,
    /// Lease expiry.
    pub expires_at: DateTime<Utc>,
}

pub(super) fn task_to_row(task: &BuildTask) -> BuildStoreResult<TaskRow> {
    let source_a =
        serde_json::to_value(task.source(SourceSlot::A)).map_err(BuildStoreError::persistence)?;
    let source_b =
        serde_json::to_value(task.source(SourceSlot::B)).map_err(BuildStoreError::persistence)?;
    let TaskChangeset {
        status,
        current_stage,
        source_a_revision,
        source_b_revision,
        started_at,
        completed_at,
        fetch_a_duration_ms,
        build_a_duration_ms,
        fetch_b_duration_ms,
        build_b_duration_ms,
        total_duration_ms,
        progress,
        progress_message,
        error_message,
    } = task_changeset(task);
    Ok(TaskRow {
        id: task.id().value(),
        token: task.token().into_inner(),
        initiator: task.initiator().value(),
        status,
        current_stage,
        source_a,
        source_b,
        source_a_revision,
        source_b_revision,
        created_at: task.created_at(),
        started_at,
        completed_at,
        fetch_a_duration_ms,
        build_a_duration_ms,
        fetch_b_duration_ms,
        build_b_duration_ms,
        total_duration_ms,
        progress,
        progress_message,
        error_message,
    })
}

pub(super) fn task_changeset(task: &BuildTask) -> TaskChangeset {
    let durations = task.stage_durations();
    TaskChangeset {
        status: task.status().as_str().to_owned(),
        current_stage: task.current_stage().map(|stage| stage.as_str().to_owned()),
        source_a_revision: task.revision(SourceSlot::A).map(str::to_owned),
        source_b_revision: task.revision(SourceSlot::B).map(str::to_owned),
        started_at: task.started_at(),
        completed_at: task.completed_at(),
        fetch_a_duration_ms: durations.get(DurationField::FetchA),
        build_a_duration_ms: durations.get(DurationField::BuildA),
        fetch_b_duration_ms: durations.get(DurationField::FetchB),
        build_b_duration_ms: durations.get(DurationField::BuildB),
        total_duration_ms: task.total_duration_ms(),
        progress: i16::from(task.progress().value()),
        progress_message: task.progress_message().map(str::to_owned),
        error_message: task.error_message().map(str::to_owned),
    }
}

pub(super) fn row_to_task(row: TaskRow) -> BuildStoreResult<BuildTask> {
    let status = TaskStatus::try_from(row.status.as_str()).map_err(BuildStoreError::persistence)?;
    let current_stage = row
        .current_stage
        .as_deref()
        .map(StageName::try_from)
        .transpose()
        .map_err(BuildStoreError::persistence)?;
    let source_a = serde_json::from_value::<SourceSelector>(row.source_a)
        .map_err(BuildStoreError::persistence)?;
    let source_b = serde_json::from_value::<SourceSelector>(row.source_b)
        .map_err(BuildStoreError::persistence)?;
    let raw_progress = u8::try_from(row.progress).map_err(BuildStoreError::persistence)?;
    let progress = Progress::new(raw_progress).map_err(BuildStoreError::persistence)?;

    Ok(BuildTask::from_persisted(PersistedBuildTask {
        id: TaskId::new(row.id).map_err(BuildStoreError::persistence)?,
        token: TaskToken::from_uuid(row.token),
        initiator: PrincipalId::new(row.initiator).map_err(BuildStoreError::persistence)?,
        status,
        current_stage,
        source_a,
        source_b,
        source_a_revision: row.source_a_revision,
        source_b_revision: row.source_b_revision,
        created_at: row.created_at,
        started_at: row.started_at,
        completed_at: row.completed_at,
        stage_durations: StageDurations::from_parts(
            row.fetch_a_duration_ms,
            row.build_a_duration_ms,
            row.fetch_b_duration_ms,
            row.build_b_duration_ms,
        ),
        total_duration_ms: row.total_duration_ms,
        progress,
        progress_message: row.progress_message,
        error_message: row.error_message,
    }))
}

pub(super) fn stage_log_to_row(log: &StageLog) -> StageLogRow {
    StageLogRow {
        id: log.id().value(),
        task_id: log.task_id().value(),
        stage: log.stage().as_str().to_owned(),
        started_at: log.started_at(),
        completed_at: log.completed_at(),
        success: log.success(),
        log_content: log.log_content().map(str::to_owned),
        error_message: log.error_message().map(str::to_owned),
    }
}

pub(super) fn row_to_stage_log(row: StageLogRow) -> BuildStoreResult<StageLog> {
    let stage = StageName::try_from(row.stage.as_str()).map_err(BuildStoreError::persistence)?;
    Ok(StageLog::from_persisted(PersistedStageLog {
        id: StageLogId::from_raw(row.id),
        task_id: TaskId::new(row.task_id).map_err(BuildStoreError::persistence)?,
        stage,
        started_at: row.started_at,
        completed_at: row.completed_at,
        success: row.success,
        log_content: row.log_content,
        error_message: row.error_message,
    }))
}

pub(super) fn artifact_to_row(artifact: &Artifact) -> BuildStoreResult<ArtifactRow> {
    let file = artifact.file();
    Ok(ArtifactRow {
        id: artifact.id().value(),
        task_id: artifact.task_id().value(),
        file_name: file.file_name.clone(),
        file_path: file.file_path.clone(),
        file_size: i64::try_from(file.file_size).map_err(BuildStoreError::persistence)?,
        checksum: file.checksum.as_str().to_owned(),
        download_url: artifact.download_url().to_owned(),
        created_at: artifact.created_at(),
        download_count: i64::try_from(artifact.download_count())
            .map_err(BuildStoreError::persistence)?,
        last_downloaded_at: artifact.last_downloaded_at(),
        is_archived: artifact.is_archived(),
        archived_at: artifact.archived_at(),
    })
}

pub(super) fn row_to_artifact(row: ArtifactRow) -> BuildStoreResult<Artifact> {
    let checksum = Checksum::new(row.checksum).map_err(BuildStoreError::persistence)?;
    Ok(Artifact::from_persisted(PersistedArtifact {
        id: ArtifactId::from_raw(row.id),
        task_id: TaskId::new(row.task_id).map_err(BuildStoreError::persistence)?,
        file: StoredFile {
            file_name: row.file_name,
            file_path: row.file_path,
            file_size: u64::try_from(row.file_size).map_err(BuildStoreError::persistence)?,
            checksum,
        },
        download_url: row.download_url,
        created_at: row.created_at,
        download_count: u64::try_from(row.download_count).map_err(BuildStoreError::persistence)?,
        last_downloaded_at: row.last_downloaded_at,
        is_archived: row.is_archived,
        archived_at: row.archived_at,
    }))
}

pub(super) fn row_to_lease(row: &LockRow) -> Option<LockLease> {
    TaskId::new(row.owner).ok().map(|owner| LockLease {
        owner,
        expires_at: row.expires_at,
    })
}
