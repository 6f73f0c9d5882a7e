// Port Layer - Interfaces for external dependencies

pub mod process;
pub mod queue_probe;
pub mod time_provider;

// Re-exports
pub use process::{ProcessSpawner, SpawnError, WorkerProcess};
pub use queue_probe::{ProbeError, QueueDepthProbe};
pub use time_provider::TimeProvider;
