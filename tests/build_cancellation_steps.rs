//! Behaviour tests for build cancellation.

#[path = "build_cancellation_steps/mod.rs"]
mod build_cancellation_steps_defs;

use build_cancellation_steps_defs::world::{CancellationWorld, world};
use rstest_bdd_macros::scenario;

#[scenario(
    path = "tests/features/build_cancellation.feature",
    name = "Cancel a build while a stage is running"
)]
#[tokio::test(flavor = "multi_thread")]
async fn cancel_running_build(world: CancellationWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/build_cancellation.feature",
    name = "Cancel a build waiting for the lock"
)]
#[tokio::test(flavor = "multi_thread")]
async fn cancel_queued_build(world: CancellationWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/build_cancellation.feature",
    name = "Reject cancelling a finished build"
)]
#[tokio::test(flavor = "multi_thread")]
async fn reject_cancelling_finished_build(world: CancellationWorld) {
    let _ = world;
}
