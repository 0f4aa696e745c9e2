//! Command runner backed by `tokio::process`.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::build::ports::{
    CommandRunner, CommandRunnerError, CommandRunnerResult, CommandSpec, ExitStatus, OutputLine,
    OutputStream, RunningCommand,
};

const LINE_BUFFER: usize = 256;

/// Spawns real child processes.
///
/// Standard output and standard error are merged into one line stream in
/// arrival order. Children are killed when their handle is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessCommandRunner;

impl ProcessCommandRunner {
    /// Creates a process runner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessCommandRunner {
    async fn spawn(&self, spec: &CommandSpec) -> CommandRunnerResult<Box<dyn RunningCommand>> {
        debug!(command = %spec, cwd = %spec.cwd(), "spawning process");
        let mut child = Command::new(spec.program())
            .args(spec.arguments())
            .current_dir(spec.cwd())
            .envs(spec.environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| CommandRunnerError::Spawn {
                program: spec.program().to_owned(),
                reason: err.to_string(),
            })?;

        let (sender, lines) = mpsc::channel(LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, OutputStream::Stdout, sender.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, OutputStream::Stderr, sender));
        }

        Ok(Box::new(ProcessCommand { child, lines }))
    }
}

/// Streams one pipe line by line until end of file.
///
/// Lines are decoded lossily so stray non-UTF-8 bytes never stop the read.
/// The pipe is drained even after the receiver goes away, which keeps the
/// child from dying on a closed pipe.
async fn forward_lines<R>(reader: R, stream: OutputStream, sender: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut pipe = BufReader::new(reader);
    let mut raw = Vec::new();
    let mut listening = true;
    loop {
        raw.clear();
        match pipe.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {
                if listening {
                    let line = OutputLine {
                        stream,
                        text: decode_line(&raw),
                    };
                    listening = sender.send(line).await.is_ok();
                }
            }
            Err(err) => {
                warn!(stream = ?stream, error = %err, "reading command output failed");
                break;
            }
        }
    }
}

/// Strips the line terminator and replaces invalid UTF-8.
fn decode_line(raw: &[u8]) -> String {
    let without_newline = raw.strip_suffix(b"\n").unwrap_or(raw);
    let trimmed = without_newline
        .strip_suffix(b"\r")
        .unwrap_or(without_newline);
    String::from_utf8_lossy(trimmed).into_owned()
}

struct ProcessCommand {
    child: Child,
    lines: mpsc::Receiver<OutputLine>,
}

#[async_trait]
impl RunningCommand for ProcessCommand {
    async fn next_line(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }

    async fn wait(&mut self) -> CommandRunnerResult<ExitStatus> {
        let status = self.child.wait().await.map_err(CommandRunnerError::io)?;
        Ok(ExitStatus {
            code: status.code(),
        })
    }

    async fn kill(&mut self) -> CommandRunnerResult<()> {
        self.child.kill().await.map_err(CommandRunnerError::io)
    }
}
