//! Event emitter boundary.

use crate::build::domain::{LogLine, TaskUpdate};

/// Receives task notifications.
///
/// Delivery is fire-and-forget: no acknowledgement, at most once per
/// emission. Implementations must preserve the order of calls made for a
/// single task.
pub trait EventSink: Send + Sync {
    /// Publishes a lifecycle transition.
    fn task_update(&self, update: TaskUpdate);

    /// Publishes one streamed output line.
    fn log_line(&self, line: LogLine);
}
