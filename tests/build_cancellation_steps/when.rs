//! When steps for build cancellation BDD scenarios.

use super::world::{CancellationWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::when;
use solobuild::build::{
    domain::{PrincipalId, StageName},
    ports::BuildStore,
    services::SubmitBuildRequest,
};
use std::time::Duration;

#[when(r#"a build is submitted for branches "{branch_a}" and "{branch_b}""#)]
fn submit_build(
    world: &mut CancellationWorld,
    branch_a: String,
    branch_b: String,
) -> Result<(), eyre::Report> {
    let request = SubmitBuildRequest::new(PrincipalId::new(1)?, &branch_a, &branch_b)?;
    let task = run_async(world.engine()?.submit(request)).wrap_err("submit build")?;
    world.submitted = Some(task);
    Ok(())
}

#[when(r#"the build reaches stage "{stage}""#)]
fn build_reaches_stage(world: &mut CancellationWorld, stage: String) -> Result<(), eyre::Report> {
    let expected = StageName::try_from(stage.as_str())
        .map_err(|err| eyre::eyre!("invalid stage in scenario: {err}"))?;
    let task_id = world.submitted()?.id();
    run_async(async {
        for _ in 0..500 {
            let current = world
                .store
                .find_task(task_id)
                .await?
                .and_then(|task| task.current_stage());
            if current == Some(expected) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Err(eyre::eyre!("build never reached stage {expected}"))
    })
}

#[when("the run finishes")]
fn run_finishes(world: &mut CancellationWorld) -> Result<(), eyre::Report> {
    let task_id = world.submitted()?.id();
    let outcome = run_async(world.engine()?.join(task_id));
    if outcome.is_none() {
        return Err(eyre::eyre!("no run was tracked for task {task_id}"));
    }
    Ok(())
}

#[when("the build is cancelled")]
fn cancel_build(world: &mut CancellationWorld) -> Result<(), eyre::Report> {
    let task_id = world.submitted()?.id();
    let engine = world.engine()?.clone();
    let result = run_async(async {
        let cancelled = engine.cancel(task_id).await;
        if cancelled.is_ok() {
            engine.join(task_id).await;
        }
        cancelled
    });
    world.last_cancel_result = Some(result);
    Ok(())
}
