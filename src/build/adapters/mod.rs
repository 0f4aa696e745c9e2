//! Adapter implementations of the build ports.

pub mod memory;
pub mod postgres;
pub mod process;
pub mod tracing_sink;
pub mod vault;

pub use process::ProcessCommandRunner;
pub use tracing_sink::{FanOutEventSink, TracingEventSink};
pub use vault::DirArtifactVault;
