//! RPC Request/Response Types

use serde::{Deserialize, Serialize};

use queueherd_core::application::{SupervisorState, WorkerSnapshot};

/// fleet.status.v1 - Inspect the running supervisor
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub state: SupervisorState,
    pub queue: String,
    /// Depth at this instant; `None` when the probe failed.
    pub depth: Option<u64>,
    pub probe_error: Option<String>,
    pub starting: usize,
    pub running: usize,
    pub total: usize,
    pub min_processes: usize,
    pub max_processes: usize,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub unexpected_exits: u64,
    pub workers: Vec<WorkerSnapshot>,
}

/// fleet.scale_up.v1 - Manually grow the fleet
#[derive(Debug, Deserialize)]
pub struct ScaleUpRequest {
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScaleUpResponse {
    pub requested: u64,
    pub added: usize,
    pub total: usize,
}

/// fleet.scale_down.v1 - Manually shrink the fleet
#[derive(Debug, Deserialize)]
pub struct ScaleDownRequest {
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScaleDownResponse {
    pub requested: u64,
    pub removed: usize,
    pub total: usize,
}

/// supervisor.stop.v1 - Initiate orderly shutdown
#[derive(Debug, Deserialize)]
pub struct StopRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct StopResponse {
    /// False when the supervisor was already draining.
    pub initiated: bool,
    pub state: SupervisorState,
}
