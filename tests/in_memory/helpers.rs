//! Shared test helpers for in-memory engine integration tests.

use camino::{Utf8Path, Utf8PathBuf};
use mockable::DefaultClock;
use rstest::fixture;
use solobuild::build::{
    adapters::{
        DirArtifactVault,
        memory::{InMemoryBuildLock, InMemoryBuildStore, RecordingEventSink},
    },
    domain::{BuildTask, PrincipalId, TaskId},
    ports::{BuildStore, CommandRunner},
    services::{BuildEngine, BuildPorts, SubmitBuildRequest},
};
use solobuild::config::EngineConfig;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Temporary directory holding working trees and stored artifacts.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Returns the workspace root.
    #[must_use]
    pub fn root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.dir.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp dir is not UTF-8: {}", path.display()))
    }

    /// Returns a configuration whose paths all live in the workspace.
    #[must_use]
    pub fn config(&self) -> EngineConfig {
        let root = self.root();
        let mut config = EngineConfig::default();
        config.source_a.workdir = root.join("source-a");
        config.source_b.workdir = root.join("source-b");
        config.package.artifact_dir = root.join("artifacts");
        config.queue.poll_interval_ms = 20;
        config
    }

    /// Writes the file the package stage picks up.
    pub fn write_package_output(&self, config: &EngineConfig, bytes: &[u8]) {
        let output = config.source_b.workdir.join(&config.package.output_path);
        write_file(&output, bytes);
    }
}

/// Creates a fresh workspace.
#[fixture]
pub fn workspace() -> Workspace {
    Workspace {
        dir: tempfile::tempdir().expect("create temp dir"),
    }
}

/// Writes `bytes` to `path`, creating parent directories.
pub fn write_file(path: &Utf8Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent directory");
    }
    std::fs::write(path, bytes).expect("write file");
}

/// Engine plus the adapters behind it.
pub struct EngineFixture {
    pub engine: BuildEngine,
    pub store: Arc<InMemoryBuildStore>,
    pub lock: Arc<InMemoryBuildLock>,
    pub events: RecordingEventSink,
}

impl EngineFixture {
    /// Wires an engine over fresh in-memory adapters and `runner`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, config: EngineConfig) -> Self {
        Self::with_adapters(
            Arc::new(InMemoryBuildStore::new()),
            Arc::new(InMemoryBuildLock::new()),
            runner,
            config,
        )
    }

    /// Wires an engine over existing store and lock adapters.
    #[must_use]
    pub fn with_adapters(
        store: Arc<InMemoryBuildStore>,
        lock: Arc<InMemoryBuildLock>,
        runner: Arc<dyn CommandRunner>,
        config: EngineConfig,
    ) -> Self {
        let events = RecordingEventSink::new();
        let ports = BuildPorts {
            store: Arc::clone(&store) as _,
            lock: Arc::clone(&lock) as _,
            runner,
            vault: Arc::new(DirArtifactVault::new(config.package.artifact_dir.clone())),
            events: Arc::new(events.clone()),
        };
        let engine = BuildEngine::new(ports, config, Arc::new(DefaultClock));
        Self {
            engine,
            store,
            lock,
            events,
        }
    }

    /// Reloads a task from the store.
    pub async fn task(&self, task_id: TaskId) -> BuildTask {
        self.store
            .find_task(task_id)
            .await
            .expect("store lookup")
            .expect("task should exist")
    }

    /// Polls until the task reaches a terminal status.
    pub async fn settled(&self, task_id: TaskId) -> BuildTask {
        for _ in 0..500 {
            let task = self.task(task_id).await;
            if task.status().is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} did not settle");
    }
}

/// Builds a request for the given branches on behalf of principal 42.
#[must_use]
pub fn request(branch_a: &str, branch_b: &str) -> SubmitBuildRequest {
    SubmitBuildRequest::new(
        PrincipalId::new(42).expect("valid principal"),
        branch_a,
        branch_b,
    )
    .expect("valid request")
}
