//! JSON-RPC Server
//!
//! Serves the control surface over TCP on localhost only; operator
//! commands are serviced concurrently with the automatic scaling loop.

use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::sync::Arc;
use tracing::info;

use crate::handler::RpcHandler;
use crate::types::{ScaleDownRequest, ScaleUpRequest, StatusRequest, StopRequest};

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9630;

/// RPC Server Configuration
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: RpcHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Start the JSON-RPC server.
    ///
    /// Security: only binds to localhost; there is no external access.
    pub async fn start(self) -> Result<ServerHandle, String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "starting JSON-RPC control surface"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;

        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("fleet.status.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StatusRequest = params.parse()?;
                    handler.status(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("fleet.scale_up.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ScaleUpRequest = params.parse()?;
                    handler.scale_up(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("fleet.scale_down.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ScaleDownRequest = params.parse()?;
                    handler.scale_down(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("supervisor.stop.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StopRequest = params.parse()?;
                    handler.stop(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!("JSON-RPC control surface started");

        let handle = server.start(module);
        Ok(handle)
    }
}
