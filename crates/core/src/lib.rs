// Queueherd Core - Domain Logic & Ports
// NO infrastructure dependencies (hexagonal layering)

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use config::Config;
pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
