//! Engine scenarios driven through the public facade with scripted
//! commands.

use crate::in_memory::helpers::{EngineFixture, Workspace, request, workspace};
use rstest::rstest;
use solobuild::build::{
    adapters::memory::{
        InMemoryBuildLock, InMemoryBuildStore, ScriptedCommandRunner, ScriptedResponse,
    },
    domain::{StageName, TaskId, TaskPhase, TaskStatus},
    ports::{BuildLock, BuildStore},
    services::{BuildEngineError, RECOVERY_MESSAGE, RunOutcome},
};
use std::sync::Arc;
use std::time::Duration;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn successful_build_produces_a_checksummed_artifact(workspace: Workspace) {
    let config = workspace.config();
    workspace.write_package_output(&config, b"release build");
    let fixture = EngineFixture::new(Arc::new(ScriptedCommandRunner::new()), config);

    let queued = fixture
        .engine
        .submit(request("main", "main"))
        .await
        .expect("submission should succeed");
    assert_eq!(queued.status(), TaskStatus::Queued);

    let outcome = fixture.engine.join(queued.id()).await;
    assert_eq!(outcome, Some(RunOutcome::Succeeded));

    let task = fixture.task(queued.id()).await;
    assert_eq!(task.status(), TaskStatus::Success);
    assert_eq!(task.progress().value(), 100);
    assert_eq!(task.progress_message(), Some("Build completed"));
    assert!(task.completed_at() >= task.started_at());

    let artifact = fixture
        .store
        .find_artifact(queued.id())
        .await
        .expect("artifact lookup")
        .expect("artifact should exist");
    assert_eq!(artifact.checksum().as_str().len(), 64);
    assert!(std::path::Path::new(&artifact.file().file_path).exists());
    assert!(fixture.lock.holder().await.expect("holder lookup").is_none());

    assert_eq!(
        fixture.events.phases(queued.token()),
        [
            TaskPhase::Created,
            TaskPhase::Queued,
            TaskPhase::Started,
            TaskPhase::Progress,
            TaskPhase::Progress,
            TaskPhase::Progress,
            TaskPhase::Progress,
            TaskPhase::Progress,
            TaskPhase::Completed,
        ]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_submission_is_rejected_while_busy(workspace: Workspace) {
    let config = workspace.config();
    let runner = ScriptedCommandRunner::new().on(
        "unity",
        None,
        ScriptedResponse::hanging(["Compiling scripts"]),
    );
    let fixture = EngineFixture::new(Arc::new(runner), config);

    let first = fixture
        .engine
        .submit(request("main", "main"))
        .await
        .expect("first submission should succeed");
    let second = fixture.engine.submit(request("main", "main")).await;
    assert!(
        matches!(second, Err(BuildEngineError::Contention { active }) if active == first.id()),
        "expected contention, got {second:?}"
    );

    let current = fixture
        .engine
        .current()
        .await
        .expect("current lookup")
        .expect("a task should be active");
    assert_eq!(current.id(), first.id());

    fixture
        .engine
        .cancel(first.id())
        .await
        .expect("cancel should succeed");
    assert_eq!(fixture.engine.join(first.id()).await, Some(RunOutcome::Cancelled));

    let third = fixture.engine.submit(request("main", "main")).await;
    assert!(third.is_ok(), "engine should accept work after cancellation");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failing_build_names_the_stage_and_frees_the_lock(workspace: Workspace) {
    let config = workspace.config();
    let runner = ScriptedCommandRunner::new().on(
        "unity",
        None,
        ScriptedResponse::exiting(2, ["error CS0246: type not found"]),
    );
    let fixture = EngineFixture::new(Arc::new(runner), config);

    let queued = fixture
        .engine
        .submit(request("feature/x", "main"))
        .await
        .expect("submission should succeed");
    let outcome = fixture.engine.join(queued.id()).await;
    assert!(matches!(outcome, Some(RunOutcome::Failed { .. })));

    let task = fixture.task(queued.id()).await;
    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.current_stage(), Some(StageName::BuildA));
    let cause = task.error_message().expect("failure cause");
    assert!(cause.contains("build_a"), "cause should name the stage: {cause}");
    assert!(fixture.lock.holder().await.expect("holder lookup").is_none());
    let next_owner = TaskId::new(999).expect("valid id");
    assert!(
        fixture
            .lock
            .acquire(next_owner, Duration::from_secs(60))
            .await
            .expect("acquire"),
        "the lock should be free for the next owner"
    );

    let logs = fixture.events.log_lines(queued.token());
    assert!(logs.iter().any(|line| line.text.contains("CS0246")));
    assert_eq!(
        fixture.events.phases(queued.token()).last(),
        Some(&TaskPhase::Failed)
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelling_a_queued_task_never_runs_it(workspace: Workspace) {
    let config = workspace.config();
    let fixture = EngineFixture::new(Arc::new(ScriptedCommandRunner::new()), config);
    let foreign = TaskId::new(10_000).expect("valid id");
    assert!(
        fixture
            .lock
            .acquire(foreign, Duration::from_secs(300))
            .await
            .expect("acquire")
    );

    let queued = fixture
        .engine
        .submit(request("main", "main"))
        .await
        .expect("submission should succeed");
    assert_eq!(fixture.engine.join(queued.id()).await, Some(RunOutcome::Deferred));

    let cancelled = fixture
        .engine
        .cancel(queued.id())
        .await
        .expect("cancel should succeed");
    assert_eq!(cancelled.status(), TaskStatus::Cancelled);
    assert!(cancelled.started_at().is_none());
    assert!(fixture.engine.queue_position(queued.id()).is_none());
    assert_eq!(
        fixture.lock.holder().await.expect("holder").map(|lease| lease.owner),
        Some(foreign)
    );

    let phases = fixture.events.phases(queued.token());
    assert!(!phases.contains(&TaskPhase::Started));
    assert_eq!(phases.last(), Some(&TaskPhase::Cancelled));
    assert!(
        fixture
            .store
            .stage_logs(queued.id())
            .await
            .expect("stage logs")
            .is_empty()
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restart_fails_unfinished_tasks(workspace: Workspace) {
    let config = workspace.config();
    let store = Arc::new(InMemoryBuildStore::new());
    let lock = Arc::new(InMemoryBuildLock::new());
    let hanging = ScriptedCommandRunner::new().on(
        "git",
        Some("clone"),
        ScriptedResponse::hanging(Vec::<String>::new()),
    );
    let before = EngineFixture::with_adapters(
        Arc::clone(&store),
        Arc::clone(&lock),
        Arc::new(hanging),
        config.clone(),
    );
    let queued = before
        .engine
        .submit(request("main", "main"))
        .await
        .expect("submission should succeed");
    before.engine.shutdown().await;

    let after = EngineFixture::with_adapters(
        store,
        lock,
        Arc::new(ScriptedCommandRunner::new()),
        config,
    );
    let recovered = after.engine.recover().await.expect("recovery should succeed");
    assert_eq!(recovered, vec![queued.id()]);

    let task = after.settled(queued.id()).await;
    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.error_message(), Some(RECOVERY_MESSAGE));
    assert!(after.lock.holder().await.expect("holder").is_none());
    assert!(after.engine.submit(request("main", "main")).await.is_ok());
}
