//! Scripted command runner for deterministic pipeline tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::build::ports::{
    CommandRunner, CommandRunnerError, CommandRunnerResult, CommandSpec, ExitStatus, OutputLine,
    OutputStream, RunningCommand,
};

/// Canned behaviour of one scripted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedResponse {
    lines: Vec<OutputLine>,
    exit: ExitStatus,
    hang: bool,
}

impl ScriptedResponse {
    /// Prints `lines` on stdout and exits with code zero.
    #[must_use]
    pub fn ok<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::exiting(0, lines)
    }

    /// Prints `lines` on stdout and exits with `code`.
    #[must_use]
    pub fn exiting<I, S>(code: i32, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines
                .into_iter()
                .map(|text| OutputLine {
                    stream: OutputStream::Stdout,
                    text: text.into(),
                })
                .collect(),
            exit: ExitStatus::from_code(code),
            hang: false,
        }
    }

    /// Prints `lines` and then blocks until killed.
    #[must_use]
    pub fn hanging<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hang: true,
            ..Self::ok(lines)
        }
    }
}

#[derive(Debug, Clone)]
struct ScriptRule {
    program: String,
    first_arg: Option<String>,
    response: ScriptedResponse,
}

impl ScriptRule {
    fn matches(&self, spec: &CommandSpec) -> bool {
        let first = spec.arguments().first().map(String::as_str);
        self.program == spec.program()
            && self
                .first_arg
                .as_deref()
                .is_none_or(|expected| first == Some(expected))
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    rules: Vec<ScriptRule>,
    invocations: Vec<CommandSpec>,
    fail_spawn: Vec<String>,
}

/// Command runner answering from a script instead of spawning processes.
///
/// Rules are matched in registration order on program name and, optionally,
/// the first argument. Unmatched commands succeed silently.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCommandRunner {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedCommandRunner {
    /// Creates a runner with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a response for `program` invoked with `first_arg`.
    #[must_use]
    pub fn on(self, program: &str, first_arg: Option<&str>, response: ScriptedResponse) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.rules.push(ScriptRule {
                program: program.to_owned(),
                first_arg: first_arg.map(str::to_owned),
                response,
            });
        }
        self
    }

    /// Makes spawning `program` fail.
    #[must_use]
    pub fn failing_to_spawn(self, program: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_spawn.push(program.to_owned());
        }
        self
    }

    /// Returns every command spawned so far, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.state
            .lock()
            .map(|state| state.invocations.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn spawn(&self, spec: &CommandSpec) -> CommandRunnerResult<Box<dyn RunningCommand>> {
        let mut state = self
            .state
            .lock()
            .map_err(|err| CommandRunnerError::io(std::io::Error::other(err.to_string())))?;
        state.invocations.push(spec.clone());

        if state.fail_spawn.iter().any(|program| program == spec.program()) {
            return Err(CommandRunnerError::Spawn {
                program: spec.program().to_owned(),
                reason: "scripted spawn failure".to_owned(),
            });
        }

        let response = state
            .rules
            .iter()
            .find(|rule| rule.matches(spec))
            .map_or_else(
                || ScriptedResponse::ok(Vec::<String>::new()),
                |rule| rule.response.clone(),
            );

        Ok(Box::new(ScriptedCommand {
            lines: response.lines.into_iter().collect(),
            exit: response.exit,
            hang: response.hang,
            killed: false,
        }))
    }
}

struct ScriptedCommand {
    lines: VecDeque<OutputLine>,
    exit: ExitStatus,
    hang: bool,
    killed: bool,
}

#[async_trait]
impl RunningCommand for ScriptedCommand {
    async fn next_line(&mut self) -> Option<OutputLine> {
        if let Some(line) = self.lines.pop_front() {
            return Some(line);
        }
        if self.hang && !self.killed {
            std::future::pending::<()>().await;
        }
        None
    }

    async fn wait(&mut self) -> CommandRunnerResult<ExitStatus> {
        if self.killed {
            return Ok(ExitStatus { code: None });
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(self.exit)
    }

    async fn kill(&mut self) -> CommandRunnerResult<()> {
        self.killed = true;
        Ok(())
    }
}
