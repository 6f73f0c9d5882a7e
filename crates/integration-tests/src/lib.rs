//! Test harness for driving the supervisor tick-by-tick against
//! deterministic mock ports.

use std::sync::Arc;
use std::time::Duration;

use queueherd_core::application::{AutoScaler, Fleet};
use queueherd_core::config::{Config, RedisConfig};
use queueherd_core::domain::WorkerCommand;
use queueherd_core::port::process::mocks::{MockProcessSpawner, TermBehavior};
use queueherd_core::port::queue_probe::mocks::MockQueueProbe;
use queueherd_core::port::time_provider::mocks::MockTimeProvider;
use queueherd_core::port::{ProbeError, ProcessSpawner, QueueDepthProbe, TimeProvider};

/// One simulated tick advances the clock by this much; the startup delay
/// is half of it, so a worker spawned in tick t is `Running` by tick t+1.
pub const TICK_MILLIS: i64 = 1_000;

pub fn scenario_config(min: usize, max: usize) -> Config {
    Config {
        queue_name: "tasks".to_string(),
        worker_command: WorkerCommand::parse("worker --queue tasks").unwrap(),
        min_processes: min,
        max_processes: max,
        check_interval: Duration::from_secs(1),
        scale_up_multiplier: 5.0,
        scale_down_multiplier: 2.5,
        graceful_shutdown_timeout: Duration::from_millis(200),
        process_startup_delay: Duration::from_millis(500),
        redis: RedisConfig {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        },
        rpc_port: 9630,
        log_level: "info".to_string(),
        log_file: None,
        strict_startup: false,
    }
}

pub struct Harness {
    pub config: Config,
    pub fleet: Arc<Fleet>,
    pub scaler: AutoScaler,
    pub probe: Arc<MockQueueProbe>,
    pub spawner: Arc<MockProcessSpawner>,
    pub clock: Arc<MockTimeProvider>,
}

impl Harness {
    pub fn new(min: usize, max: usize, script: Vec<Result<u64, ProbeError>>) -> Self {
        Self::with_behavior(min, max, script, TermBehavior::Exit)
    }

    pub fn with_behavior(
        min: usize,
        max: usize,
        script: Vec<Result<u64, ProbeError>>,
        behavior: TermBehavior,
    ) -> Self {
        let config = scenario_config(min, max);
        let spawner = Arc::new(MockProcessSpawner::with_behavior(behavior));
        let clock = Arc::new(MockTimeProvider::new(1_000_000));
        let probe = Arc::new(MockQueueProbe::scripted(script));
        let fleet = Arc::new(Fleet::new(
            &config,
            Arc::clone(&spawner) as Arc<dyn ProcessSpawner>,
            Arc::clone(&clock) as Arc<dyn TimeProvider>,
        ));
        let scaler = AutoScaler::new(
            &config,
            Arc::clone(&fleet),
            Arc::clone(&probe) as Arc<dyn QueueDepthProbe>,
        );
        Self {
            config,
            fleet,
            scaler,
            probe,
            spawner,
            clock,
        }
    }

    /// Bring the fleet to `n` running workers without consuming the
    /// probe script.
    pub async fn warm_up(&self, n: usize) {
        self.fleet.grow(n).await;
        self.clock.advance(TICK_MILLIS);
        self.fleet.size().await;
    }

    /// One autoscaler tick followed by a clock advance to the next one.
    pub async fn tick(&self) {
        self.scaler.tick().await;
        self.clock.advance(TICK_MILLIS);
    }

    pub async fn total(&self) -> usize {
        self.fleet.size().await.total
    }
}
