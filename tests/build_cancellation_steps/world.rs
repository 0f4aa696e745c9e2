//! Shared world state for build cancellation BDD scenarios.

use std::sync::Arc;

use camino::Utf8PathBuf;
use mockable::DefaultClock;
use rstest::fixture;
use solobuild::build::{
    adapters::{
        DirArtifactVault,
        memory::{
            InMemoryBuildLock, InMemoryBuildStore, RecordingEventSink, ScriptedCommandRunner,
        },
    },
    domain::BuildTask,
    services::{BuildEngine, BuildEngineError, BuildPorts},
};
use solobuild::config::EngineConfig;
use tempfile::TempDir;

/// Scenario world for build cancellation behaviour tests.
pub struct CancellationWorld {
    pub workspace: TempDir,
    pub store: Arc<InMemoryBuildStore>,
    pub lock: Arc<InMemoryBuildLock>,
    pub events: RecordingEventSink,
    pub engine: Option<BuildEngine>,
    pub submitted: Option<BuildTask>,
    pub last_cancel_result: Option<Result<BuildTask, BuildEngineError>>,
}

impl CancellationWorld {
    /// Creates a world with no engine yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            workspace: tempfile::tempdir().expect("create scenario workspace"),
            store: Arc::new(InMemoryBuildStore::new()),
            lock: Arc::new(InMemoryBuildLock::new()),
            events: RecordingEventSink::new(),
            engine: None,
            submitted: None,
            last_cancel_result: None,
        }
    }

    /// Builds the engine over the world's adapters and `runner`.
    pub fn install_engine(&mut self, runner: ScriptedCommandRunner) {
        let root = Utf8PathBuf::from_path_buf(self.workspace.path().to_path_buf())
            .unwrap_or_else(|path| panic!("workspace is not UTF-8: {}", path.display()));
        let mut config = EngineConfig::default();
        config.source_a.workdir = root.join("source-a");
        config.source_b.workdir = root.join("source-b");
        config.package.artifact_dir = root.join("artifacts");

        let output = config.source_b.workdir.join(&config.package.output_path);
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).expect("create output directory");
        }
        std::fs::write(&output, b"scenario apk").expect("write package output");

        let ports = BuildPorts {
            store: Arc::clone(&self.store) as _,
            lock: Arc::clone(&self.lock) as _,
            runner: Arc::new(runner),
            vault: Arc::new(DirArtifactVault::new(config.package.artifact_dir.clone())),
            events: Arc::new(self.events.clone()),
        };
        self.engine = Some(BuildEngine::new(ports, config, Arc::new(DefaultClock)));
    }

    /// Returns the installed engine.
    ///
    /// # Errors
    ///
    /// Returns an error when no Given step installed one.
    pub fn engine(&self) -> Result<&BuildEngine, eyre::Report> {
        self.engine
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing engine in scenario world"))
    }

    /// Returns the submitted task snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when nothing was submitted.
    pub fn submitted(&self) -> Result<&BuildTask, eyre::Report> {
        self.submitted
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing submitted task in scenario world"))
    }
}

impl Default for CancellationWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> CancellationWorld {
    CancellationWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
