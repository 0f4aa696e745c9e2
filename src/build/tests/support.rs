//! Shared fixtures for build unit tests.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;
use std::sync::{Arc, Mutex, PoisonError};

use crate::build::adapters::memory::{
    InMemoryBuildLock, InMemoryBuildStore, RecordingEventSink, ScriptedCommandRunner,
};
use crate::build::adapters::DirArtifactVault;
use crate::build::domain::{BranchName, NewBuildTask, PrincipalId, SourceSelector};
use crate::build::services::BuildPorts;
use crate::config::EngineConfig;

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7)
        .single()
        .expect("valid timestamp")
}

pub fn draft(clock: &impl Clock) -> NewBuildTask {
    NewBuildTask::new(
        PrincipalId::new(1).expect("valid principal"),
        SourceSelector::new(BranchName::new("main").expect("valid branch")),
        SourceSelector::new(BranchName::new("develop").expect("valid branch")),
        clock,
    )
}

/// Engine configuration rooted in `root`, with the package output already
/// present so the package stage can succeed.
pub fn config_in(root: &Utf8Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.source_a.workdir = root.join("source-a");
    config.source_b.workdir = root.join("source-b");
    config.package.artifact_dir = root.join("artifacts");
    let output = config.source_b.workdir.join(&config.package.output_path);
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).expect("create output directory");
    }
    std::fs::write(&output, b"apk bytes").expect("write package output");
    config
}

pub fn utf8_root(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("temp dir is UTF-8")
}

/// In-memory ports with handles kept for assertions.
pub struct Harness {
    pub store: Arc<InMemoryBuildStore>,
    pub lock: Arc<InMemoryBuildLock>,
    pub runner: ScriptedCommandRunner,
    pub events: RecordingEventSink,
    pub ports: BuildPorts,
}

impl Harness {
    pub fn new(runner: ScriptedCommandRunner, artifact_dir: &Utf8Path) -> Self {
        let store = Arc::new(InMemoryBuildStore::new());
        let lock = Arc::new(InMemoryBuildLock::new());
        let events = RecordingEventSink::new();
        let ports = BuildPorts {
            store: Arc::clone(&store) as _,
            lock: Arc::clone(&lock) as _,
            runner: Arc::new(runner.clone()),
            vault: Arc::new(DirArtifactVault::new(artifact_dir)),
            events: Arc::new(events.clone()),
        };
        Self {
            store,
            lock,
            runner,
            events,
            ports,
        }
    }
}
