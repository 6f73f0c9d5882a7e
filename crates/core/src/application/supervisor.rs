// Supervisor - top-level coordinator
//
// Owns the fleet and the autoscaler, sequences orderly shutdown, and
// tracks the process-level state machine:
//
//     Initializing -> Running -> Draining -> Stopped
//
// Draining is entered exactly once; repeated stop requests are logged and
// ignored. Escalation happens inside Fleet::stop_all per worker, never
// here.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::autoscaler::AutoScaler;
use super::fleet::Fleet;
use super::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::config::Config;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupervisorState {
    Initializing,
    Running,
    Draining,
    Stopped,
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorState::Initializing => write!(f, "INITIALIZING"),
            SupervisorState::Running => write!(f, "RUNNING"),
            SupervisorState::Draining => write!(f, "DRAINING"),
            SupervisorState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Cloneable handle for requesting shutdown and reading the supervisor
/// state, shared with the signal handler and the control surface.
#[derive(Clone)]
pub struct StopHandle {
    state: Arc<Mutex<SupervisorState>>,
    shutdown: Arc<ShutdownSender>,
}

impl StopHandle {
    pub fn state(&self) -> SupervisorState {
        *self.state.lock().unwrap()
    }

    /// Request orderly shutdown. The first call enters Draining and
    /// returns true; every later call is benign.
    pub fn request_stop(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match *state {
            SupervisorState::Initializing | SupervisorState::Running => {
                *state = SupervisorState::Draining;
                info!("shutdown requested, draining");
                self.shutdown.shutdown();
                true
            }
            SupervisorState::Draining => {
                info!("shutdown already in progress, ignoring repeated request");
                false
            }
            SupervisorState::Stopped => false,
        }
    }

    fn set_state(&self, next: SupervisorState) {
        *self.state.lock().unwrap() = next;
    }
}

/// Top-level coordinator. Wires the fleet and the autoscaler together and
/// drives the lifecycle from initial spawn to the last reaped worker.
pub struct Supervisor {
    fleet: Arc<Fleet>,
    autoscaler: Arc<AutoScaler>,
    stop_handle: StopHandle,
    shutdown_token: ShutdownToken,
    initial_processes: usize,
}

impl Supervisor {
    /// Build a supervisor. `initial_processes` is clamped to the
    /// configured bounds.
    pub fn new(
        config: &Config,
        fleet: Arc<Fleet>,
        autoscaler: Arc<AutoScaler>,
        initial_processes: Option<usize>,
    ) -> Self {
        let initial = initial_processes
            .unwrap_or(config.min_processes)
            .clamp(config.min_processes, config.max_processes);
        let (sender, token) = shutdown_channel();
        let stop_handle = StopHandle {
            state: Arc::new(Mutex::new(SupervisorState::Initializing)),
            shutdown: Arc::new(sender),
        };
        Self {
            fleet,
            autoscaler,
            stop_handle,
            shutdown_token: token,
            initial_processes: initial,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop_handle.clone()
    }

    pub fn state(&self) -> SupervisorState {
        self.stop_handle.state()
    }

    /// Run until a stop is requested, then drain: autoscaler first, fleet
    /// second, per the shutdown ordering contract.
    pub async fn run(&self) -> Result<()> {
        info!(initial = self.initial_processes, "starting initial workers");
        let added = self.fleet.grow(self.initial_processes).await;
        if added < self.initial_processes {
            warn!(
                requested = self.initial_processes,
                added, "started fewer initial workers than requested"
            );
        }
        self.stop_handle.set_state(SupervisorState::Running);
        info!("supervisor running");

        let autoscaler = Arc::clone(&self.autoscaler);
        let token = self.shutdown_token.clone();
        let loop_handle = tokio::spawn(async move {
            autoscaler.run(token).await;
        });

        let mut token = self.shutdown_token.clone();
        token.wait().await;

        // State is already Draining (set by whoever requested the stop)
        let _ = loop_handle.await;
        self.fleet.stop_all().await;
        self.stop_handle.set_state(SupervisorState::Stopped);
        info!("supervisor stopped");
        Ok(())
    }
}
