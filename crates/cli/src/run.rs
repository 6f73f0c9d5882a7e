//! The `start` path: configuration, logging, dependency wiring, signal
//! handling, and the supervisor's lifetime.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use queueherd_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use queueherd_core::application::{AutoScaler, Fleet, Supervisor};
use queueherd_core::config::Config;
use queueherd_core::port::time_provider::SystemTimeProvider;
use queueherd_core::port::{ProcessSpawner, QueueDepthProbe, TimeProvider};
use queueherd_infra_redis::RedisQueueProbe;
use queueherd_infra_system::TokioProcessSpawner;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes for the `start` command.
const EXIT_OK: i32 = 0;
const EXIT_STARTUP_FAILURE: i32 = 1;
const EXIT_BROKER_UNREACHABLE: i32 = 2;

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let open_log_file = || -> anyhow::Result<Option<std::sync::Mutex<std::fs::File>>> {
        match &config.log_file {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Ok(Some(std::sync::Mutex::new(file)))
            }
            None => Ok(None),
        }
    };

    let log_format =
        std::env::var("QUEUEHERD_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            let file_layer =
                open_log_file()?.map(|writer| fmt::layer().with_ansi(false).with_writer(writer));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .with(file_layer)
                .init();
        }
        _ => {
            // Development: pretty formatting with colors
            let file_layer =
                open_log_file()?.map(|writer| fmt::layer().with_ansi(false).with_writer(writer));
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .with(file_layer)
                .init();
        }
    }
    Ok(())
}

/// Run the supervisor until signaled. Returns the process exit code.
pub async fn run(initial_processes: Option<usize>) -> i32 {
    // 1. Load configuration (fatal on any invariant violation)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("queueherd: {}", e);
            return EXIT_STARTUP_FAILURE;
        }
    };

    // 2. Initialize logging
    if let Err(e) = init_logging(&config) {
        eprintln!("queueherd: failed to initialize logging: {}", e);
        return EXIT_STARTUP_FAILURE;
    }

    info!(version = VERSION, "queueherd starting");
    info!(
        queue = %config.queue_name,
        command = %config.worker_command,
        min = config.min_processes,
        max = config.max_processes,
        interval_secs = config.check_interval.as_secs_f64(),
        broker = %format!("{}:{}", config.redis.host, config.redis.port),
        "effective configuration"
    );

    // 3. Broker probe (pooled connection, reused across ticks)
    let probe: Arc<dyn QueueDepthProbe> =
        match RedisQueueProbe::new(&config.redis.url(), config.probe_timeout()) {
            Ok(probe) => Arc::new(probe),
            Err(e) => {
                error!(error = %e, "invalid broker configuration");
                return EXIT_STARTUP_FAILURE;
            }
        };

    if config.strict_startup {
        if let Err(e) = probe.ping().await {
            error!(error = %e, "broker unreachable at startup (strict mode)");
            return EXIT_BROKER_UNREACHABLE;
        }
        info!("broker reachable");
    }

    // 4. Wire the fleet, the autoscaler and the supervisor
    let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let spawner: Arc<dyn ProcessSpawner> = Arc::new(TokioProcessSpawner::new());
    let fleet = Arc::new(Fleet::new(&config, spawner, time));
    let autoscaler = Arc::new(AutoScaler::new(
        &config,
        Arc::clone(&fleet),
        Arc::clone(&probe),
    ));
    let supervisor = Supervisor::new(&config, Arc::clone(&fleet), autoscaler, initial_processes);
    let stop_handle = supervisor.stop_handle();

    // 5. Start the control surface
    let rpc_config = RpcServerConfig {
        port: config.rpc_port,
        ..Default::default()
    };
    let handler = RpcHandler::new(&config, Arc::clone(&fleet), probe, stop_handle.clone());
    let rpc_handle = match RpcServer::new(rpc_config, handler).start().await {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to start control surface");
            return EXIT_STARTUP_FAILURE;
        }
    };

    // 6. Signal handling: SIGTERM and SIGINT both drain; repeats are benign
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            return EXIT_STARTUP_FAILURE;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "failed to install SIGINT handler");
            return EXIT_STARTUP_FAILURE;
        }
    };
    let signal_stop = stop_handle.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            }
            signal_stop.request_stop();
        }
    });

    // 7. Run until drained
    if let Err(e) = supervisor.run().await {
        error!(error = %e, "supervisor failed");
        return EXIT_STARTUP_FAILURE;
    }

    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "control surface was already stopped");
    }

    info!("shutdown complete");
    EXIT_OK
}
