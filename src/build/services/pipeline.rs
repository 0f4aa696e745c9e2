//! Sequential stage pipeline executor.
//!
//! A run acquires the global lock, walks [`PIPELINE`] in order and stops at
//! the first failing stage. Finalisation always releases the lock and then
//! writes the terminal status.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use chrono::{DateTime, SecondsFormat, Utc};
use minijinja::Environment;
use mockable::Clock;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::cancellation::CancellationToken;
use super::capture::LogCapture;
use super::error::{BuildEngineError, BuildEngineResult, StageError};
use super::stages::{PIPELINE, StageBody, StageDescriptor};
use super::state_machine::TaskStateMachine;
use crate::build::domain::{
    BuildTask, LogLine, NewArtifact, NewStageLog, Progress, SourceSlot, StageLogClosure,
    StageName, TaskId, TaskStatus, TaskToken, render_arg_value,
};
use crate::build::ports::{
    ArtifactVault, BuildLock, BuildStore, CommandRunner, CommandRunnerError, CommandSpec,
    EventSink, OutputStream, RunningCommand,
};
use crate::config::{EngineConfig, SourceConfig};

/// Infrastructure the executor drives.
#[derive(Clone)]
pub struct BuildPorts {
    /// Task, stage log and artifact records.
    pub store: Arc<dyn BuildStore>,
    /// Global single-flight lock.
    pub lock: Arc<dyn BuildLock>,
    /// External command runner.
    pub runner: Arc<dyn CommandRunner>,
    /// Artifact storage.
    pub vault: Arc<dyn ArtifactVault>,
    /// Observer notifications.
    pub events: Arc<dyn EventSink>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every stage completed and the task is `SUCCESS`.
    Succeeded,
    /// The task is `FAILED` with `cause`.
    Failed {
        /// Recorded failure cause.
        cause: String,
    },
    /// The task was cancelled.
    Cancelled,
    /// Another task held the lock; the task is still waiting.
    Deferred,
}

impl RunOutcome {
    /// Derives the outcome already recorded on `task`.
    #[must_use]
    pub fn settled(task: &BuildTask) -> Self {
        match task.status() {
            TaskStatus::Success => Self::Succeeded,
            TaskStatus::Failed => Self::Failed {
                cause: task.error_message().unwrap_or_default().to_owned(),
            },
            TaskStatus::Cancelled => Self::Cancelled,
            TaskStatus::Pending | TaskStatus::Queued | TaskStatus::Running => Self::Deferred,
        }
    }

    /// Returns `true` for [`RunOutcome::Succeeded`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Per-stage working state.
struct StageRun<'a> {
    task: &'a BuildTask,
    stage: StageName,
    capture: LogCapture,
    cancel: &'a CancellationToken,
}

/// Runs the stage pipeline for one task at a time.
pub struct PipelineExecutor<C> {
    ports: BuildPorts,
    machine: TaskStateMachine<C>,
    config: Arc<EngineConfig>,
    clock: Arc<C>,
}

impl<C> PipelineExecutor<C>
where
    C: Clock + Send + Sync + 'static,
{
    /// Creates an executor over `ports`.
    #[must_use]
    pub fn new(ports: BuildPorts, config: Arc<EngineConfig>, clock: Arc<C>) -> Self {
        let machine = TaskStateMachine::new(
            Arc::clone(&ports.store),
            Arc::clone(&ports.lock),
            Arc::clone(&ports.events),
            Arc::clone(&clock),
        );
        Self {
            ports,
            machine,
            config,
            clock,
        }
    }

    /// Returns the state machine used for task transitions.
    #[must_use]
    pub const fn state_machine(&self) -> &TaskStateMachine<C> {
        &self.machine
    }

    /// Executes the pipeline for `task_id`.
    ///
    /// Errors never escape: stage failures and infrastructure failures both
    /// end the task `FAILED`, and the lock is released in every case.
    pub async fn run(&self, task_id: TaskId, cancel: CancellationToken) -> RunOutcome {
        match self.lock_and_execute(task_id, &cancel).await {
            Ok(outcome) => outcome,
            Err(err) => self.abort(task_id, &err).await,
        }
    }

    async fn lock_and_execute(
        &self,
        task_id: TaskId,
        cancel: &CancellationToken,
    ) -> BuildEngineResult<RunOutcome> {
        let task = self
            .ports
            .store
            .find_task(task_id)
            .await?
            .ok_or(BuildEngineError::NotFound(task_id))?;
        if task.status().is_terminal() {
            return Ok(RunOutcome::settled(&task));
        }
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        if !self.ports.lock.acquire(task_id, self.config.lease()).await? {
            warn!(task_id = %task_id, "build lock busy; task stays queued");
            return Ok(RunOutcome::Deferred);
        }

        let verdict = self.execute(task_id, cancel).await;
        self.release_lock(task_id).await;
        match verdict? {
            RunOutcome::Succeeded => {
                self.machine.succeed(task_id).await?;
                Ok(RunOutcome::Succeeded)
            }
            RunOutcome::Failed { cause } => {
                self.machine.fail(task_id, &cause).await?;
                Ok(RunOutcome::Failed { cause })
            }
            other @ (RunOutcome::Cancelled | RunOutcome::Deferred) => Ok(other),
        }
    }

    async fn execute(
        &self,
        task_id: TaskId,
        cancel: &CancellationToken,
    ) -> BuildEngineResult<RunOutcome> {
        self.machine.start(task_id).await?;
        for descriptor in &PIPELINE {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }
            let progress = Progress::new(descriptor.checkpoint)?;
            let task = self
                .machine
                .enter_stage(task_id, descriptor.name, progress, descriptor.message)
                .await?;
            if let Some(stop) = self.run_stage(&task, descriptor, cancel).await? {
                return Ok(stop);
            }
        }
        Ok(RunOutcome::Succeeded)
    }

    /// Runs one stage and closes its log. Returns `Some` when the pipeline
    /// must stop.
    async fn run_stage(
        &self,
        task: &BuildTask,
        descriptor: &StageDescriptor,
        cancel: &CancellationToken,
    ) -> BuildEngineResult<Option<RunOutcome>> {
        let log = self
            .ports
            .store
            .open_stage_log(NewStageLog {
                task_id: task.id(),
                stage: descriptor.name,
                started_at: self.clock.utc(),
            })
            .await?;

        let mut run = StageRun {
            task,
            stage: descriptor.name,
            capture: LogCapture::new(self.config.pipeline.max_captured_log_bytes),
            cancel,
        };
        let result = self.run_body(&mut run, descriptor.body).await;
        let finished_at = self.clock.utc();
        let captured = run.capture.into_text();

        match result {
            Ok(()) => {
                let closed = self
                    .ports
                    .store
                    .close_stage_log(log.id(), StageLogClosure::succeeded(finished_at, captured))
                    .await?;
                let recorded = descriptor.duration_field.zip(closed.duration());
                if let Some((field, duration)) = recorded {
                    self.machine
                        .record_duration(task.id(), field, duration.num_milliseconds())
                        .await?;
                }
                debug!(task_id = %task.id(), stage = %descriptor.name, "stage completed");
                Ok(None)
            }
            Err(StageError::Cancelled(stage)) => {
                let closure = StageLogClosure::failed(
                    finished_at,
                    captured,
                    StageError::Cancelled(stage).to_string(),
                );
                self.ports.store.close_stage_log(log.id(), closure).await?;
                info!(task_id = %task.id(), stage = %stage, "stage interrupted by cancellation");
                Ok(Some(RunOutcome::Cancelled))
            }
            Err(err) => {
                let cause = format!("{} failed: {err}", descriptor.name);
                let closure = StageLogClosure::failed(finished_at, captured, cause.clone());
                self.ports.store.close_stage_log(log.id(), closure).await?;
                self.ports.events.log_line(LogLine {
                    token: task.token(),
                    stage: descriptor.name,
                    text: cause.clone(),
                    at: finished_at,
                });
                warn!(task_id = %task.id(), stage = %descriptor.name, error = %err, "stage failed");
                Ok(Some(RunOutcome::Failed { cause }))
            }
        }
    }

    async fn run_body(&self, run: &mut StageRun<'_>, body: StageBody) -> Result<(), StageError> {
        match body {
            StageBody::Fetch(slot) => self.fetch(run, slot).await,
            StageBody::Build(slot) => self.build(run, slot).await,
            StageBody::Package => self.package(run).await,
        }
    }

    async fn fetch(&self, run: &mut StageRun<'_>, slot: SourceSlot) -> Result<(), StageError> {
        let source = self.config.source(slot);
        let git = self.config.pipeline.git_program.as_str();
        let branch = run.task.branch(slot).as_str().to_owned();
        let workdir = &source.workdir;

        if workdir.join(".git").exists() {
            let steps = [
                vec!["fetch".to_owned()],
                vec!["checkout".to_owned(), branch.clone()],
                vec!["pull".to_owned()],
            ];
            for step in steps {
                self.run_command(run, CommandSpec::new(git, workdir.clone()).args(step))
                    .await?;
            }
        } else {
            let (parent, target) = split_workdir(workdir);
            Dir::create_ambient_dir_all(&parent, ambient_authority())
                .map_err(CommandRunnerError::io)?;
            let clone = CommandSpec::new(git, parent).args([
                "clone".to_owned(),
                "--branch".to_owned(),
                branch.clone(),
                source.url.clone(),
                target,
            ]);
            self.run_command(run, clone).await?;
        }

        let rev_parse = CommandSpec::new(git, workdir.clone()).args(["rev-parse", "HEAD"]);
        if let Some(revision) = self.run_command(run, rev_parse).await? {
            debug!(task_id = %run.task.id(), slot = slot.as_str(), revision, "revision resolved");
            self.machine
                .record_revision(run.task.id(), slot, revision)
                .await?;
        }
        Ok(())
    }

    async fn build(&self, run: &mut StageRun<'_>, slot: SourceSlot) -> Result<(), StageError> {
        let source = self.config.source(slot);
        let context = template_context(run.task, slot, source);

        if let Some(prepare) = &source.prepare_command {
            let argv = render_argv(prepare, &context)?;
            self.run_command(run, command_from_argv(argv, &source.workdir)?)
                .await?;
        }

        let mut argv = render_argv(&source.build_command, &context)?;
        for (key, value) in run.task.source(slot).args() {
            argv.extend(source.arg_style.render(key, &render_arg_value(value)));
        }
        self.run_command(run, command_from_argv(argv, &source.workdir)?)
            .await?;
        Ok(())
    }

    async fn package(&self, run: &mut StageRun<'_>) -> Result<(), StageError> {
        let output = self
            .config
            .source_b
            .workdir
            .join(&self.config.package.output_path);
        let created_at = self.clock.utc();
        let file_name = artifact_file_name(created_at, run.task.token(), output.extension());
        run.capture
            .push_line(&format!("Storing {output} as {file_name}"));

        let stored = self.ports.vault.store(&output, &file_name).await?;
        let artifact = self
            .ports
            .store
            .create_artifact(NewArtifact {
                task_id: run.task.id(),
                file: stored,
                created_at,
            })
            .await?;

        run.capture.push_line(&format!(
            "Artifact saved: {} ({} bytes, sha256 {})",
            artifact.file().file_name,
            artifact.file().file_size,
            artifact.checksum()
        ));
        info!(
            task_id = %run.task.id(),
            file_name = %artifact.file().file_name,
            checksum = %artifact.checksum(),
            "artifact recorded"
        );
        Ok(())
    }

    /// Runs `spec` to completion, streaming its output.
    ///
    /// Returns the last non-empty standard output line.
    async fn run_command(
        &self,
        run: &mut StageRun<'_>,
        spec: CommandSpec,
    ) -> Result<Option<String>, StageError> {
        debug!(task_id = %run.task.id(), stage = %run.stage, command = %spec, "running command");
        let mut command = self.ports.runner.spawn(&spec).await?;
        let mut last_stdout = None;

        loop {
            let next = tokio::select! {
                line = command.next_line() => line,
                () = run.cancel.cancelled() => {
                    terminate(command.as_mut(), run).await;
                    return Err(StageError::Cancelled(run.stage));
                }
            };
            let Some(line) = next else {
                break;
            };
            let trimmed = line.text.trim();
            if line.stream == OutputStream::Stdout && !trimmed.is_empty() {
                last_stdout = Some(trimmed.to_owned());
            }
            run.capture.push_line(&line.text);
            self.ports.events.log_line(LogLine {
                token: run.task.token(),
                stage: run.stage,
                text: line.text,
                at: self.clock.utc(),
            });
        }

        let status = tokio::select! {
            status = command.wait() => status?,
            () = run.cancel.cancelled() => {
                terminate(command.as_mut(), run).await;
                return Err(StageError::Cancelled(run.stage));
            }
        };
        if !status.success() {
            return Err(StageError::NonZeroExit {
                program: spec.program().to_owned(),
                status: status.to_string(),
            });
        }
        Ok(last_stdout)
    }

    async fn release_lock(&self, task_id: TaskId) {
        match self.ports.lock.release(task_id).await {
            Ok(released) => debug!(task_id = %task_id, released, "run finalised lock"),
            Err(err) => error!(task_id = %task_id, error = %err, "failed to release build lock"),
        }
    }

    /// Outer failure boundary: records `err` as the failure cause unless the
    /// task already settled, then releases the lock.
    async fn abort(&self, task_id: TaskId, err: &BuildEngineError) -> RunOutcome {
        match self.ports.store.find_task(task_id).await {
            Ok(Some(task)) if task.status().is_terminal() => {
                self.release_lock(task_id).await;
                return RunOutcome::settled(&task);
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                error!(task_id = %task_id, error = %err, "run aborted for unknown task");
                return RunOutcome::Failed {
                    cause: err.to_string(),
                };
            }
            Err(lookup) => {
                warn!(task_id = %task_id, error = %lookup, "could not reload task after run error");
            }
        }

        let cause = err.to_string();
        error!(task_id = %task_id, error = %cause, "build run aborted");
        self.release_lock(task_id).await;
        if let Err(fail_err) = self.machine.fail(task_id, &cause).await {
            error!(task_id = %task_id, error = %fail_err, "failed to record run failure");
        }
        RunOutcome::Failed { cause }
    }
}

async fn terminate(command: &mut dyn RunningCommand, run: &StageRun<'_>) {
    if let Err(err) = command.kill().await {
        warn!(task_id = %run.task.id(), stage = %run.stage, error = %err, "failed to kill command");
    }
}

/// Builds the artifact file name for a task finishing at `at`.
///
/// The timestamp uses `-` in place of `:` and `.` so the name is portable.
#[must_use]
pub fn artifact_file_name(at: DateTime<Utc>, token: TaskToken, extension: Option<&str>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    match extension {
        Some(ext) if !ext.is_empty() => format!("{stamp}_{token}.{ext}"),
        _ => format!("{stamp}_{token}"),
    }
}

/// Splits a working tree path into the clone directory and target name.
fn split_workdir(workdir: &Utf8Path) -> (Utf8PathBuf, String) {
    match (workdir.parent(), workdir.file_name()) {
        (Some(parent), Some(name)) if !parent.as_str().is_empty() => {
            (parent.to_owned(), name.to_owned())
        }
        (_, Some(name)) => (Utf8PathBuf::from("."), name.to_owned()),
        _ => (Utf8PathBuf::from("."), workdir.as_str().to_owned()),
    }
}

fn template_context(
    task: &BuildTask,
    slot: SourceSlot,
    source: &SourceConfig,
) -> Map<String, Value> {
    let mut context = Map::new();
    context.insert(
        "workdir".to_owned(),
        Value::String(source.workdir.as_str().to_owned()),
    );
    context.insert(
        "branch".to_owned(),
        Value::String(task.branch(slot).as_str().to_owned()),
    );
    context.insert(
        "task_token".to_owned(),
        Value::String(task.token().to_string()),
    );
    context.insert("task_id".to_owned(), Value::from(task.id().value()));
    context
}

fn render_argv(
    templates: &[String],
    context: &Map<String, Value>,
) -> Result<Vec<String>, StageError> {
    let environment = Environment::new();
    templates
        .iter()
        .map(|template| {
            environment
                .render_str(template, context)
                .map_err(|err| StageError::Template {
                    template: template.clone(),
                    reason: err.to_string(),
                })
        })
        .collect()
}

fn command_from_argv(argv: Vec<String>, cwd: &Utf8Path) -> Result<CommandSpec, StageError> {
    let mut parts = argv.into_iter();
    let program = parts.next().ok_or_else(|| StageError::Template {
        template: String::new(),
        reason: "command is empty".to_owned(),
    })?;
    Ok(CommandSpec::new(program, cwd).args(parts))
}
