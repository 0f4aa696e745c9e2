//! Runs one build from the command line.
//!
//! Usage:
//!
//! ```text
//! solobuild <config.toml> <branch-a> <branch-b> [--principal <id>]
//! ```
//!
//! Task records live in memory for the lifetime of the process. The exit
//! code is zero only when the task finishes `SUCCESS`.

use camino::Utf8PathBuf;
use mockable::DefaultClock;
use solobuild::build::adapters::memory::{InMemoryBuildLock, InMemoryBuildStore};
use solobuild::build::adapters::{DirArtifactVault, ProcessCommandRunner, TracingEventSink};
use solobuild::build::domain::{PrincipalId, TaskDomainError};
use solobuild::build::services::{
    BuildEngine, BuildEngineError, BuildPorts, RunOutcome, SubmitBuildRequest,
};
use solobuild::config::{ConfigError, EngineConfig};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Principal recorded when `--principal` is not given.
const DEFAULT_PRINCIPAL: i64 = 1;

#[derive(Debug, Error)]
enum CliError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    #[error(transparent)]
    Engine(#[from] BuildEngineError),
}

#[derive(Debug, PartialEq, Eq)]
struct CliArgs {
    config: Utf8PathBuf,
    principal: i64,
    branch_a: String,
    branch_b: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    solobuild::telemetry::init();
    match run(env::args().skip(1)).await {
        Ok(RunOutcome::Succeeded) => ExitCode::SUCCESS,
        Ok(outcome) => {
            error!(?outcome, "build did not succeed");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(error = %err, "solobuild failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: impl Iterator<Item = String>) -> Result<RunOutcome, CliError> {
    let cli = parse_args(args)?;
    let config = EngineConfig::load(&cli.config)?;

    let ports = BuildPorts {
        store: Arc::new(InMemoryBuildStore::new()),
        lock: Arc::new(InMemoryBuildLock::<DefaultClock>::new()),
        runner: Arc::new(ProcessCommandRunner::new()),
        vault: Arc::new(DirArtifactVault::new(config.package.artifact_dir.clone())),
        events: Arc::new(TracingEventSink::new()),
    };
    let engine = BuildEngine::new(ports, config, Arc::new(DefaultClock));
    engine.recover().await?;

    let request = SubmitBuildRequest::new(
        PrincipalId::new(cli.principal)?,
        &cli.branch_a,
        &cli.branch_b,
    )?;
    let task = engine.submit(request).await?;
    info!(task_id = %task.id(), token = %task.token(), "build submitted");

    let outcome = engine
        .join(task.id())
        .await
        .unwrap_or_else(|| RunOutcome::Failed {
            cause: "run handle missing".to_owned(),
        });
    engine.shutdown().await;
    Ok(outcome)
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<CliArgs, CliError> {
    let mut principal = DEFAULT_PRINCIPAL;
    let mut positional = Vec::with_capacity(3);
    let mut rest = args;
    while let Some(arg) = rest.next() {
        if arg == "--principal" {
            let raw = rest
                .next()
                .ok_or_else(|| CliError::InvalidArgs("--principal needs a value".into()))?;
            principal = raw.parse().map_err(|_| {
                CliError::InvalidArgs(format!("principal must be an integer: {raw}"))
            })?;
        } else if arg.starts_with("--") {
            return Err(CliError::InvalidArgs(format!("unknown flag: {arg}")));
        } else {
            positional.push(arg);
        }
    }

    let mut values = positional.into_iter();
    let (Some(config), Some(branch_a), Some(branch_b), None) =
        (values.next(), values.next(), values.next(), values.next())
    else {
        return Err(CliError::InvalidArgs(
            "usage: solobuild <config.toml> <branch-a> <branch-b> [--principal <id>]".into(),
        ));
    };
    Ok(CliArgs {
        config: Utf8PathBuf::from(config),
        principal,
        branch_a,
        branch_b,
    })
}
