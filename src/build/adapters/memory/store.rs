//! In-memory state store.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::build::{
    domain::{
        Artifact, ArtifactId, BuildTask, NewArtifact, NewBuildTask, NewStageLog, StageLog,
        StageLogClosure, StageLogId, TaskId, TaskToken, TaskTransition,
    },
    ports::{BuildStore, BuildStoreError, BuildStoreResult, SortOrder, TaskQuery},
};

/// Thread-safe in-memory build store.
///
/// Each operation runs under one write or read guard, which gives the
/// per-task atomicity and read-committed visibility the port requires.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBuildStore {
    state: Arc<RwLock<InMemoryBuildState>>,
}

#[derive(Debug, Default)]
struct InMemoryBuildState {
    next_task_id: i64,
    next_stage_log_id: i64,
    next_artifact_id: i64,
    tasks: BTreeMap<TaskId, BuildTask>,
    token_index: HashMap<TaskToken, TaskId>,
    stage_logs: BTreeMap<StageLogId, StageLog>,
    artifacts: HashMap<TaskId, Artifact>,
}

impl InMemoryBuildStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> BuildStoreResult<std::sync::RwLockReadGuard<'_, InMemoryBuildState>> {
        self.state
            .read()
            .map_err(|err| BuildStoreError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> BuildStoreResult<std::sync::RwLockWriteGuard<'_, InMemoryBuildState>> {
        self.state
            .write()
            .map_err(|err| BuildStoreError::persistence(std::io::Error::other(err.to_string())))
    }
}

/// Advances a sequence and returns the new value.
const fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[async_trait]
impl BuildStore for InMemoryBuildStore {
    async fn create_task(&self, draft: NewBuildTask) -> BuildStoreResult<BuildTask> {
        let mut state = self.write()?;
        if state.token_index.contains_key(&draft.token()) {
            return Err(BuildStoreError::DuplicateToken(draft.token()));
        }

        let id = TaskId::new(next_id(&mut state.next_task_id))?;
        let task = BuildTask::create(id, draft);
        state.token_index.insert(task.token(), id);
        state.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn find_task(&self, id: TaskId) -> BuildStoreResult<Option<BuildTask>> {
        let state = self.read()?;
        Ok(state.tasks.get(&id).cloned())
    }

    async fn find_task_by_token(&self, token: TaskToken) -> BuildStoreResult<Option<BuildTask>> {
        let state = self.read()?;
        Ok(state
            .token_index
            .get(&token)
            .and_then(|id| state.tasks.get(id))
            .cloned())
    }

    async fn update_task(
        &self,
        id: TaskId,
        transition: TaskTransition,
    ) -> BuildStoreResult<BuildTask> {
        let mut state = self.write()?;
        let stored = state
            .tasks
            .get_mut(&id)
            .ok_or(BuildStoreError::TaskNotFound(id))?;

        // Apply to a copy so a rejected transition leaves the record intact.
        let mut updated = stored.clone();
        updated.apply(transition)?;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn query_tasks(&self, query: &TaskQuery) -> BuildStoreResult<Vec<BuildTask>> {
        let state = self.read()?;
        let mut matches: Vec<BuildTask> = state
            .tasks
            .values()
            .filter(|task| query.matches(task))
            .cloned()
            .collect();

        matches.sort_by(|left, right| {
            let by_age = left
                .created_at()
                .cmp(&right.created_at())
                .then(left.id().cmp(&right.id()));
            match query.order() {
                SortOrder::OldestFirst => by_age,
                SortOrder::NewestFirst => by_age.reverse(),
            }
        });

        let page = matches.into_iter().skip(query.skip());
        Ok(match query.take() {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        })
    }

    async fn open_stage_log(&self, new: NewStageLog) -> BuildStoreResult<StageLog> {
        let mut state = self.write()?;
        if !state.tasks.contains_key(&new.task_id) {
            return Err(BuildStoreError::TaskNotFound(new.task_id));
        }

        let id = StageLogId::from_raw(next_id(&mut state.next_stage_log_id));
        let log = StageLog::open(id, new);
        state.stage_logs.insert(id, log.clone());
        Ok(log)
    }

    async fn close_stage_log(
        &self,
        id: StageLogId,
        closure: StageLogClosure,
    ) -> BuildStoreResult<StageLog> {
        let mut state = self.write()?;
        let log = state
            .stage_logs
            .get_mut(&id)
            .ok_or(BuildStoreError::StageLogNotFound(id))?;
        log.close(closure)?;
        Ok(log.clone())
    }

    async fn stage_logs(&self, task_id: TaskId) -> BuildStoreResult<Vec<StageLog>> {
        let state = self.read()?;
        Ok(state
            .stage_logs
            .values()
            .filter(|log| log.task_id() == task_id)
            .cloned()
            .collect())
    }

    async fn create_artifact(&self, new: NewArtifact) -> BuildStoreResult<Artifact> {
        let mut state = self.write()?;
        if !state.tasks.contains_key(&new.task_id) {
            return Err(BuildStoreError::TaskNotFound(new.task_id));
        }
        if state.artifacts.contains_key(&new.task_id) {
            return Err(BuildStoreError::DuplicateArtifact(new.task_id));
        }

        let id = ArtifactId::from_raw(next_id(&mut state.next_artifact_id));
        let artifact = Artifact::create(id, new);
        state.artifacts.insert(artifact.task_id(), artifact.clone());
        Ok(artifact)
    }

    async fn find_artifact(&self, task_id: TaskId) -> BuildStoreResult<Option<Artifact>> {
        let state = self.read()?;
        Ok(state.artifacts.get(&task_id).cloned())
    }
}
