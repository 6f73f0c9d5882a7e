//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method. Operator
//! mutations and the autoscaler's are serialized by the fleet lock; the
//! outcome of interleaved commands is their sequential composition.

use std::sync::Arc;

use jsonrpsee::types::ErrorObjectOwned;
use tracing::info;

use queueherd_core::application::{Fleet, StopHandle};
use queueherd_core::config::Config;
use queueherd_core::error::AppError;
use queueherd_core::port::QueueDepthProbe;

use crate::error::to_rpc_error;
use crate::types::{
    ScaleDownRequest, ScaleDownResponse, ScaleUpRequest, ScaleUpResponse, StatusRequest,
    StatusResponse, StopRequest, StopResponse,
};

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    fleet: Arc<Fleet>,
    probe: Arc<dyn QueueDepthProbe>,
    stop: StopHandle,
    queue_name: String,
    up_multiplier: f64,
    down_multiplier: f64,
}

impl RpcHandler {
    pub fn new(
        config: &Config,
        fleet: Arc<Fleet>,
        probe: Arc<dyn QueueDepthProbe>,
        stop: StopHandle,
    ) -> Self {
        Self {
            fleet,
            probe,
            stop,
            queue_name: config.queue_name.clone(),
            up_multiplier: config.scale_up_multiplier,
            down_multiplier: config.scale_down_multiplier,
        }
    }

    fn validate_count(count: u64) -> Result<usize, ErrorObjectOwned> {
        if count < 1 {
            return Err(to_rpc_error(AppError::Validation(
                "count must be at least 1".to_string(),
            )));
        }
        Ok(count as usize)
    }

    /// fleet.status.v1
    pub async fn status(&self, _params: StatusRequest) -> Result<StatusResponse, ErrorObjectOwned> {
        let (depth, probe_error) = match self.probe.depth(&self.queue_name).await {
            Ok(depth) => (Some(depth), None),
            Err(e) => (None, Some(e.to_string())),
        };
        let size = self.fleet.size().await;
        let workers = self.fleet.snapshot().await;

        Ok(StatusResponse {
            state: self.stop.state(),
            queue: self.queue_name.clone(),
            depth,
            probe_error,
            starting: size.starting,
            running: size.running,
            total: size.total,
            min_processes: self.fleet.min_processes(),
            max_processes: self.fleet.max_processes(),
            scale_up_threshold: size.total as f64 * self.up_multiplier,
            scale_down_threshold: size.total as f64 * self.down_multiplier,
            unexpected_exits: self.fleet.unexpected_exits(),
            workers,
        })
    }

    /// fleet.scale_up.v1
    pub async fn scale_up(
        &self,
        params: ScaleUpRequest,
    ) -> Result<ScaleUpResponse, ErrorObjectOwned> {
        let count = Self::validate_count(params.count)?;
        info!(count, "manual scale-up requested");
        let added = self.fleet.grow(count).await;
        Ok(ScaleUpResponse {
            requested: params.count,
            added,
            total: self.fleet.size().await.total,
        })
    }

    /// fleet.scale_down.v1
    pub async fn scale_down(
        &self,
        params: ScaleDownRequest,
    ) -> Result<ScaleDownResponse, ErrorObjectOwned> {
        let count = Self::validate_count(params.count)?;
        info!(count, "manual scale-down requested");
        let removed = self.fleet.shrink(count).await;
        Ok(ScaleDownResponse {
            requested: params.count,
            removed,
            total: self.fleet.size().await.total,
        })
    }

    /// supervisor.stop.v1
    pub async fn stop(&self, _params: StopRequest) -> Result<StopResponse, ErrorObjectOwned> {
        let initiated = self.stop.request_stop();
        Ok(StopResponse {
            initiated,
            state: self.stop.state(),
        })
    }
}
