//! Given steps for build cancellation BDD scenarios.

use super::world::{CancellationWorld, run_async};
use eyre::{WrapErr, ensure};
use rstest_bdd_macros::given;
use solobuild::build::{
    adapters::memory::{ScriptedCommandRunner, ScriptedResponse},
    domain::TaskId,
    ports::BuildLock,
};
use std::time::Duration;

/// Owner recorded for the lock held outside the engine.
const FOREIGN_OWNER: i64 = 90_001;

#[given("a build engine whose source A build never finishes")]
fn engine_with_hanging_build(world: &mut CancellationWorld) {
    let runner = ScriptedCommandRunner::new().on(
        "unity",
        None,
        ScriptedResponse::hanging(["Reimporting assets"]),
    );
    world.install_engine(runner);
}

#[given("a build engine whose lock is held by another task")]
fn engine_with_foreign_lock(world: &mut CancellationWorld) -> Result<(), eyre::Report> {
    world.install_engine(ScriptedCommandRunner::new());
    let owner = TaskId::new(FOREIGN_OWNER)?;
    let acquired = run_async(world.lock.acquire(owner, Duration::from_secs(600)))
        .wrap_err("acquire lock for foreign owner")?;
    ensure!(acquired, "foreign owner should obtain the free lock");
    Ok(())
}

#[given("a build engine with instant commands")]
fn engine_with_instant_commands(world: &mut CancellationWorld) {
    world.install_engine(ScriptedCommandRunner::new());
}
