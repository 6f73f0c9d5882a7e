// Domain Layer - Worker model

pub mod error;
pub mod worker;

pub use error::DomainError;
pub use worker::{ExitInfo, WorkerCommand, WorkerState};
