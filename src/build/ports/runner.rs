//! External command runner port.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for command runner operations.
pub type CommandRunnerResult<T> = Result<T, CommandRunnerError>;

/// Program invocation handed to a runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Utf8PathBuf,
    env: BTreeMap<String, String>,
}

impl CommandSpec {
    /// Creates a spec running `program` in `cwd`.
    #[must_use]
    pub fn new(program: impl Into<String>, cwd: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Returns the program.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the arguments.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Returns the working directory.
    #[must_use]
    pub fn cwd(&self) -> &Utf8Path {
        &self.cwd
    }

    /// Returns extra environment variables.
    #[must_use]
    pub const fn environment(&self) -> &BTreeMap<String, String> {
        &self.env
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Stream a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// One line of child output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Originating stream.
    pub stream: OutputStream,
    /// Line text without the trailing newline.
    pub text: String,
}

/// Exit status of a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code; `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitStatus {
    /// Status of a command that exited with `code`.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// Returns `true` for exit code zero.
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("termination by signal"),
        }
    }
}

/// Handle to a live child process.
#[async_trait]
pub trait RunningCommand: Send {
    /// Returns the next output line, or `None` once output is exhausted.
    async fn next_line(&mut self) -> Option<OutputLine>;

    /// Waits for the child to exit.
    ///
    /// # Errors
    ///
    /// Returns [`CommandRunnerError::Io`] when the exit status cannot be
    /// collected.
    async fn wait(&mut self) -> CommandRunnerResult<ExitStatus>;

    /// Best-effort termination of the child.
    ///
    /// # Errors
    ///
    /// Returns [`CommandRunnerError::Io`] when the signal cannot be sent.
    async fn kill(&mut self) -> CommandRunnerResult<()>;
}

/// Launches external commands with incremental output delivery.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Starts `spec` and returns a handle streaming its output.
    ///
    /// # Errors
    ///
    /// Returns [`CommandRunnerError::Spawn`] when the program cannot start.
    async fn spawn(&self, spec: &CommandSpec) -> CommandRunnerResult<Box<dyn RunningCommand>>;
}

/// Errors returned by command runners.
#[derive(Debug, Clone, Error)]
pub enum CommandRunnerError {
    /// The program could not be started.
    #[error("failed to start '{program}': {reason}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying reason.
        reason: String,
    },

    /// I/O failure while talking to the child.
    #[error("command i/o error: {0}")]
    Io(Arc<dyn std::error::Error + Send + Sync>),
}

impl CommandRunnerError {
    /// Wraps an I/O error.
    pub fn io(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Io(Arc::new(err))
    }
}
