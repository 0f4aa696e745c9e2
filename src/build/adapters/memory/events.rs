//! In-memory event sink that records every notification.

use std::sync::{Arc, Mutex};

use crate::build::{
    domain::{LogLine, TaskPhase, TaskToken, TaskUpdate},
    ports::EventSink,
};

/// Notification captured by [`RecordingEventSink`], in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A lifecycle update.
    Update(TaskUpdate),
    /// A streamed output line.
    Log(LogLine),
}

/// Event sink keeping an ordered journal of everything it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    journal: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl RecordingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded event in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.journal
            .lock()
            .map(|journal| journal.clone())
            .unwrap_or_default()
    }

    /// Returns the lifecycle phases announced for `token`, in order.
    #[must_use]
    pub fn phases(&self, token: TaskToken) -> Vec<TaskPhase> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RecordedEvent::Update(update) if update.token == token => Some(update.phase),
                _ => None,
            })
            .collect()
    }

    /// Returns the log lines streamed for `token`, in order.
    #[must_use]
    pub fn log_lines(&self, token: TaskToken) -> Vec<LogLine> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RecordedEvent::Log(line) if line.token == token => Some(line),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: RecordedEvent) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(event);
        }
    }
}

impl EventSink for RecordingEventSink {
    fn task_update(&self, update: TaskUpdate) {
        self.push(RecordedEvent::Update(update));
    }

    fn log_line(&self, line: LogLine) {
        self.push(RecordedEvent::Log(line));
    }
}
