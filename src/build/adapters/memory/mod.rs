//! In-memory adapters for tests and single-node deployments.

mod events;
mod lock;
mod runner;
mod store;

pub use events::{RecordedEvent, RecordingEventSink};
pub use lock::InMemoryBuildLock;
pub use runner::{ScriptedCommandRunner, ScriptedResponse};
pub use store::InMemoryBuildStore;
