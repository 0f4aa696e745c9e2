//! Event sinks that log notifications and fan them out.

use std::sync::Arc;
use tracing::{debug, info};

use crate::build::domain::{LogLine, TaskUpdate};
use crate::build::ports::EventSink;

/// Writes every notification to the `tracing` subscriber.
///
/// Lifecycle updates are logged at `info`, output lines at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl TracingEventSink {
    /// Creates a tracing sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EventSink for TracingEventSink {
    fn task_update(&self, update: TaskUpdate) {
        info!(
            token = %update.token,
            task_id = %update.task_id,
            phase = update.phase.as_str(),
            status = %update.status,
            stage = update.stage.map(|stage| stage.as_str()),
            progress = %update.progress,
            success = update.success,
            message = update.message.as_deref().unwrap_or_default(),
            "task update"
        );
    }

    fn log_line(&self, line: LogLine) {
        debug!(token = %line.token, stage = %line.stage, "{}", line.text);
    }
}

/// Forwards each notification to several sinks in registration order.
#[derive(Clone, Default)]
pub struct FanOutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanOutEventSink {
    /// Creates a sink with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Returns the number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns `true` when there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for FanOutEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutEventSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventSink for FanOutEventSink {
    fn task_update(&self, update: TaskUpdate) {
        for sink in &self.sinks {
            sink.task_update(update.clone());
        }
    }

    fn log_line(&self, line: LogLine) {
        for sink in &self.sinks {
            sink.log_line(line.clone());
        }
    }
}
