// Worker Domain Model

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Lifecycle state of a managed worker process.
///
/// `Dead` is terminal: once a worker has exited it never re-enters any
/// other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Starting,
    Running,
    Stopping,
    Dead,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Starting => write!(f, "STARTING"),
            WorkerState::Running => write!(f, "RUNNING"),
            WorkerState::Stopping => write!(f, "STOPPING"),
            WorkerState::Dead => write!(f, "DEAD"),
        }
    }
}

/// How a worker exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub signaled: bool,
}

/// The executable plus fixed argument vector launched per worker.
///
/// Every worker is launched with the exact same command line; there is no
/// per-worker parameterization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parse a command line by whitespace splitting.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let mut parts = s.split_whitespace().map(|p| p.to_string());
        let program = parts.next().ok_or(DomainError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl std::fmt::Display for WorkerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
