//! Full pipeline runs against real child processes.

use crate::in_memory::helpers::{EngineFixture, Workspace, request, workspace, write_file};
use camino::Utf8Path;
use rstest::rstest;
use solobuild::build::{
    adapters::ProcessCommandRunner,
    domain::{SourceSlot, StageName, TaskStatus},
    ports::BuildStore,
    services::RunOutcome,
};
use solobuild::config::EngineConfig;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

const REVISION: &str = "0123456789abcdef0123456789abcdef01234567";

/// Writes a stand-in version control program that creates clone targets
/// and reports a fixed revision.
fn install_fake_git(root: &Utf8Path) -> String {
    let path = root.join("bin/fake-git");
    let script = format!(
        "#!/bin/sh\ncase \"$1\" in\n  clone) mkdir -p \"$5\" ;;\n  rev-parse) echo {REVISION} ;;\nesac\n"
    );
    write_file(&path, script.as_bytes());
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("make fake git executable");
    path.into_string()
}

fn shell(script: &str) -> Vec<String> {
    vec!["sh".to_owned(), "-c".to_owned(), script.to_owned()]
}

fn process_config(workspace: &Workspace) -> EngineConfig {
    let mut config = workspace.config();
    config.pipeline.git_program = install_fake_git(&workspace.root());
    config.source_a.build_command = shell("echo building {{ branch }}");
    config.source_b.prepare_command = None;
    config.source_b.build_command =
        shell("mkdir -p build && printf 'apk-{{ task_id }}' > build/app.apk");
    config.package.output_path = "build/app.apk".into();
    config
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn pipeline_runs_real_commands_end_to_end(workspace: Workspace) {
    let config = process_config(&workspace);
    let artifact_dir = config.package.artifact_dir.clone();
    let fixture = EngineFixture::new(Arc::new(ProcessCommandRunner::new()), config);

    let queued = fixture
        .engine
        .submit(request("feature/login", "main"))
        .await
        .expect("submission should succeed");
    assert_eq!(fixture.engine.join(queued.id()).await, Some(RunOutcome::Succeeded));

    let task = fixture.task(queued.id()).await;
    assert_eq!(task.status(), TaskStatus::Success);
    assert_eq!(task.revision(SourceSlot::A), Some(REVISION));
    assert_eq!(task.revision(SourceSlot::B), Some(REVISION));

    let logs = fixture.store.stage_logs(queued.id()).await.expect("logs");
    let build_a = logs
        .iter()
        .find(|log| log.stage() == StageName::BuildA)
        .expect("build_a log");
    assert_eq!(build_a.log_content(), Some("building feature/login\n"));

    let artifact = fixture
        .store
        .find_artifact(queued.id())
        .await
        .expect("artifact lookup")
        .expect("artifact");
    let stored = artifact_dir.join(&artifact.file().file_name);
    let bytes = std::fs::read(&stored).expect("stored artifact should be readable");
    assert_eq!(bytes, format!("apk-{}", queued.id()).into_bytes());
    assert_eq!(artifact.file().file_size, u64::try_from(bytes.len()).expect("size"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn non_zero_exit_captures_stderr(workspace: Workspace) {
    let mut config = process_config(&workspace);
    config.source_a.build_command = shell("echo 'missing license' >&2; exit 4");
    let fixture = EngineFixture::new(Arc::new(ProcessCommandRunner::new()), config);

    let queued = fixture
        .engine
        .submit(request("main", "main"))
        .await
        .expect("submission should succeed");
    let outcome = fixture.engine.join(queued.id()).await;

    let Some(RunOutcome::Failed { cause }) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(cause.contains("build_a"), "{cause}");
    assert!(cause.contains("exit code 4"), "{cause}");

    let logs = fixture.store.stage_logs(queued.id()).await.expect("logs");
    let failed = logs.last().expect("failed stage log");
    assert_eq!(failed.success(), Some(false));
    assert!(
        failed
            .log_content()
            .is_some_and(|text| text.contains("missing license"))
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancel_kills_the_running_process(workspace: Workspace) {
    let mut config = process_config(&workspace);
    config.source_a.build_command = vec!["sleep".to_owned(), "30".to_owned()];
    let fixture = EngineFixture::new(Arc::new(ProcessCommandRunner::new()), config);

    let queued = fixture
        .engine
        .submit(request("main", "main"))
        .await
        .expect("submission should succeed");
    for _ in 0..500 {
        if fixture.task(queued.id()).await.current_stage() == Some(StageName::BuildA) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fixture
        .engine
        .cancel(queued.id())
        .await
        .expect("cancel should succeed");
    let outcome = tokio::time::timeout(Duration::from_secs(10), fixture.engine.join(queued.id()))
        .await
        .expect("cancelled run should stop promptly");
    assert_eq!(outcome, Some(RunOutcome::Cancelled));
    assert_eq!(fixture.settled(queued.id()).await.status(), TaskStatus::Cancelled);
}
