//! Then steps for build cancellation BDD scenarios.

use super::world::{CancellationWorld, run_async};
use rstest_bdd_macros::then;
use solobuild::build::{
    domain::{StageName, TaskPhase, TaskStatus},
    ports::{BuildLock, BuildStore},
    services::BuildEngineError,
};

#[then(r#"the build status is "{status}""#)]
fn build_status_is(world: &CancellationWorld, status: String) -> Result<(), eyre::Report> {
    let expected = TaskStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let task_id = world.submitted()?.id();
    let task = run_async(world.store.find_task(task_id))?
        .ok_or_else(|| eyre::eyre!("missing task {task_id}"))?;

    if task.status() != expected {
        return Err(eyre::eyre!(
            "expected status {}, found {}",
            expected.as_str(),
            task.status().as_str()
        ));
    }
    Ok(())
}

#[then("the build lock is free")]
fn build_lock_is_free(world: &CancellationWorld) -> Result<(), eyre::Report> {
    if let Some(lease) = run_async(world.lock.holder())? {
        return Err(eyre::eyre!("lock still held by task {}", lease.owner));
    }
    Ok(())
}

#[then(r#"the last stage log for "{stage}" is marked failed"#)]
fn stage_log_marked_failed(world: &CancellationWorld, stage: String) -> Result<(), eyre::Report> {
    let expected = StageName::try_from(stage.as_str())
        .map_err(|err| eyre::eyre!("invalid stage in scenario: {err}"))?;
    let task_id = world.submitted()?.id();
    let logs = run_async(world.store.stage_logs(task_id))?;
    let log = logs
        .iter()
        .rev()
        .find(|log| log.stage() == expected)
        .ok_or_else(|| eyre::eyre!("no stage log for {expected}"))?;

    if log.success() != Some(false) {
        return Err(eyre::eyre!(
            "expected failed stage log, got {:?}",
            log.success()
        ));
    }
    Ok(())
}

#[then("the build never started")]
fn build_never_started(world: &CancellationWorld) -> Result<(), eyre::Report> {
    let task = world.submitted()?;
    let phases = world.events.phases(task.token());
    if phases.contains(&TaskPhase::Started) {
        return Err(eyre::eyre!("build was started: {phases:?}"));
    }
    let logs = run_async(world.store.stage_logs(task.id()))?;
    if !logs.is_empty() {
        return Err(eyre::eyre!("expected no stage logs, found {}", logs.len()));
    }
    Ok(())
}

#[then("the cancellation is rejected because the build already finished")]
fn cancellation_rejected(world: &CancellationWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_cancel_result
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing cancellation result"))?;

    if !matches!(result, Err(BuildEngineError::AlreadyFinished { .. })) {
        return Err(eyre::eyre!(
            "expected AlreadyFinished error, got {result:?}"
        ));
    }
    Ok(())
}
