// Queueherd Infrastructure - System Adapters
// Implements: ProcessSpawner, WorkerProcess

pub mod process_spawner;

pub use process_spawner::TokioProcessSpawner;
