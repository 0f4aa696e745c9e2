//! Unit tests for build domain values and the task state machine.

use super::support::{ManualClock, draft, epoch};
use crate::build::domain::{
    BranchName, BuildTask, Checksum, NewStageLog, Progress, SourceSlot, StageLog, StageLogClosure,
    StageLogId, StageName, TaskDomainError, TaskId, TaskStatus, TaskTransition,
    render_arg_value,
};
use chrono::TimeDelta;
use eyre::ensure;
use mockable::Clock;
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn clock() -> ManualClock {
    ManualClock::at(epoch())
}

#[fixture]
fn pending_task(clock: ManualClock) -> BuildTask {
    BuildTask::create(TaskId::new(1).expect("valid id"), draft(&clock))
}

fn start(task: &mut BuildTask, clock: &ManualClock) -> Result<(), TaskDomainError> {
    task.apply(TaskTransition::Start {
        at: clock.utc(),
        message: "Starting build process".to_owned(),
    })
}

#[rstest]
#[case(TaskStatus::Pending, TaskStatus::Queued, true)]
#[case(TaskStatus::Pending, TaskStatus::Running, true)]
#[case(TaskStatus::Pending, TaskStatus::Success, false)]
#[case(TaskStatus::Pending, TaskStatus::Failed, true)]
#[case(TaskStatus::Pending, TaskStatus::Cancelled, true)]
#[case(TaskStatus::Queued, TaskStatus::Pending, false)]
#[case(TaskStatus::Queued, TaskStatus::Queued, false)]
#[case(TaskStatus::Queued, TaskStatus::Running, true)]
#[case(TaskStatus::Queued, TaskStatus::Success, false)]
#[case(TaskStatus::Queued, TaskStatus::Failed, true)]
#[case(TaskStatus::Queued, TaskStatus::Cancelled, true)]
#[case(TaskStatus::Running, TaskStatus::Queued, false)]
#[case(TaskStatus::Running, TaskStatus::Running, true)]
#[case(TaskStatus::Running, TaskStatus::Success, true)]
#[case(TaskStatus::Running, TaskStatus::Failed, true)]
#[case(TaskStatus::Running, TaskStatus::Cancelled, true)]
#[case(TaskStatus::Success, TaskStatus::Running, false)]
#[case(TaskStatus::Failed, TaskStatus::Queued, false)]
#[case(TaskStatus::Cancelled, TaskStatus::Running, false)]
fn can_transition_to_returns_expected(
    #[case] from: TaskStatus,
    #[case] to: TaskStatus,
    #[case] expected: bool,
) {
    assert_eq!(from.can_transition_to(to), expected);
}

#[rstest]
#[case("pending", TaskStatus::Pending)]
#[case("QUEUED", TaskStatus::Queued)]
#[case(" running ", TaskStatus::Running)]
#[case("cancelled", TaskStatus::Cancelled)]
fn status_parses_case_insensitively(#[case] raw: &str, #[case] expected: TaskStatus) {
    assert_eq!(TaskStatus::try_from(raw), Ok(expected));
}

#[rstest]
fn terminal_statuses_are_not_active() {
    for status in [TaskStatus::Success, TaskStatus::Failed, TaskStatus::Cancelled] {
        assert!(status.is_terminal());
        assert!(!status.is_active());
    }
    assert!(TaskStatus::ACTIVE.iter().all(|status| status.is_active()));
}

#[rstest]
#[case("")]
#[case("   ")]
fn blank_branch_is_rejected(#[case] raw: &str) {
    assert_eq!(BranchName::new(raw), Err(TaskDomainError::EmptyBranch));
}

#[rstest]
#[case(0, true)]
#[case(100, true)]
#[case(101, false)]
fn progress_is_a_percentage(#[case] value: u8, #[case] valid: bool) {
    assert_eq!(Progress::new(value).is_ok(), valid);
}

#[rstest]
#[case("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad", true)]
#[case("BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD", false)]
#[case("ba7816bf", false)]
fn checksum_requires_lowercase_sha256_hex(#[case] raw: &str, #[case] valid: bool) {
    assert_eq!(Checksum::new(raw).is_ok(), valid);
}

#[rstest]
#[case(json!("release"), "release")]
#[case(json!(true), "true")]
#[case(json!(42), "42")]
fn arg_values_render_for_command_lines(#[case] value: serde_json::Value, #[case] expected: &str) {
    assert_eq!(render_arg_value(&value), expected);
}

#[rstest]
fn new_task_is_pending_with_zero_progress(pending_task: BuildTask) {
    assert_eq!(pending_task.status(), TaskStatus::Pending);
    assert_eq!(pending_task.progress(), Progress::ZERO);
    assert!(pending_task.current_stage().is_none());
    assert!(pending_task.started_at().is_none());
}

#[rstest]
fn success_sets_full_progress_and_durations(
    clock: ManualClock,
    mut pending_task: BuildTask,
) -> eyre::Result<()> {
    start(&mut pending_task, &clock)?;
    pending_task.apply(TaskTransition::EnterStage {
        stage: StageName::FetchA,
        progress: Progress::new(10)?,
        message: "Fetching source A repository".to_owned(),
    })?;
    pending_task.apply(TaskTransition::RecordRevision {
        slot: SourceSlot::A,
        revision: "abc123".to_owned(),
    })?;
    clock.advance(TimeDelta::seconds(90));
    pending_task.apply(TaskTransition::Succeed {
        at: clock.utc(),
        message: "Build completed".to_owned(),
    })?;

    ensure!(pending_task.status() == TaskStatus::Success);
    ensure!(pending_task.progress() == Progress::COMPLETE);
    ensure!(pending_task.revision(SourceSlot::A) == Some("abc123"));
    ensure!(pending_task.total_duration_ms() == Some(90_000));
    ensure!(pending_task.completed_at() >= pending_task.started_at());
    Ok(())
}

#[rstest]
fn progress_never_moves_backwards(
    clock: ManualClock,
    mut pending_task: BuildTask,
) -> eyre::Result<()> {
    start(&mut pending_task, &clock)?;
    pending_task.apply(TaskTransition::EnterStage {
        stage: StageName::BuildA,
        progress: Progress::new(30)?,
        message: "Building source A".to_owned(),
    })?;
    let regression = pending_task.apply(TaskTransition::EnterStage {
        stage: StageName::FetchA,
        progress: Progress::new(10)?,
        message: "Fetching source A repository".to_owned(),
    });

    ensure!(matches!(
        regression,
        Err(TaskDomainError::ProgressRegression {
            current: 30,
            requested: 10,
            ..
        })
    ));
    ensure!(pending_task.current_stage() == Some(StageName::BuildA));
    Ok(())
}

#[rstest]
fn stage_changes_require_running(mut pending_task: BuildTask) -> eyre::Result<()> {
    let result = pending_task.apply(TaskTransition::EnterStage {
        stage: StageName::FetchA,
        progress: Progress::new(10)?,
        message: "Fetching source A repository".to_owned(),
    });
    ensure!(matches!(
        result,
        Err(TaskDomainError::InvalidTransition {
            from: TaskStatus::Pending,
            to: TaskStatus::Running,
            ..
        })
    ));
    Ok(())
}

#[rstest]
fn terminal_tasks_reject_every_transition(
    clock: ManualClock,
    mut pending_task: BuildTask,
) -> eyre::Result<()> {
    pending_task.apply(TaskTransition::Fail {
        at: clock.utc(),
        cause: "first".to_owned(),
    })?;
    let result = pending_task.apply(TaskTransition::Cancel {
        at: clock.utc(),
        reason: "task cancelled by user".to_owned(),
    });

    ensure!(matches!(
        result,
        Err(TaskDomainError::TaskFinished {
            status: TaskStatus::Failed,
            ..
        })
    ));
    ensure!(pending_task.error_message() == Some("first"));
    Ok(())
}

#[rstest]
fn cancelling_a_queued_task_skips_running(
    clock: ManualClock,
    mut pending_task: BuildTask,
) -> eyre::Result<()> {
    pending_task.apply(TaskTransition::Enqueue {
        message: "Task queued".to_owned(),
    })?;
    pending_task.apply(TaskTransition::Cancel {
        at: clock.utc(),
        reason: "task cancelled by user".to_owned(),
    })?;

    ensure!(pending_task.status() == TaskStatus::Cancelled);
    ensure!(pending_task.started_at().is_none());
    ensure!(pending_task.total_duration_ms().is_none());
    ensure!(pending_task.error_message() == Some("task cancelled by user"));
    Ok(())
}

#[rstest]
fn stage_log_closes_once(clock: ManualClock) -> eyre::Result<()> {
    let task_id = TaskId::new(4)?;
    let mut log = StageLog::open(
        StageLogId::from_raw(9),
        NewStageLog {
            task_id,
            stage: StageName::Package,
            started_at: clock.utc(),
        },
    );
    clock.advance(TimeDelta::milliseconds(1_500));
    log.close(StageLogClosure::succeeded(clock.utc(), "done".to_owned()))?;
    let second = log.close(StageLogClosure::failed(
        clock.utc(),
        String::new(),
        "late".to_owned(),
    ));

    ensure!(second == Err(TaskDomainError::StageLogClosed(StageLogId::from_raw(9))));
    ensure!(log.success() == Some(true));
    ensure!(log.log_content() == Some("done"));
    ensure!(log.duration() == Some(TimeDelta::milliseconds(1_500)));
    Ok(())
}
