// Runtime Configuration
// Read once from the environment at startup; immutable afterwards.
// A change requires a restart.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::WorkerCommand;
use crate::error::{AppError, Result};

const DEFAULT_QUEUE_NAME: &str = "default";
const DEFAULT_MIN_PROCESSES: usize = 1;
const DEFAULT_MAX_PROCESSES: usize = 10;
const DEFAULT_CHECK_INTERVAL_SECS: f64 = 180.0;
const DEFAULT_SCALE_UP_MULTIPLIER: f64 = 5.0;
const DEFAULT_SCALE_DOWN_MULTIPLIER: f64 = 2.5;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: f64 = 30.0;
const DEFAULT_PROCESS_STARTUP_DELAY_SECS: f64 = 5.0;
const DEFAULT_REDIS_HOST: &str = "localhost";
const DEFAULT_REDIS_PORT: u16 = 6379;
const DEFAULT_RPC_PORT: u16 = 9630;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Probe timeouts must stay well under the check interval so a dead broker
/// cannot stall the loop.
const PROBE_TIMEOUT_DIVISOR: u32 = 3;
const PROBE_TIMEOUT_CAP: Duration = Duration::from_secs(5);

/// Broker connection parameters.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Validated supervisor parameters.
#[derive(Debug, Clone)]
pub struct Config {
    pub queue_name: String,
    pub worker_command: WorkerCommand,
    pub min_processes: usize,
    pub max_processes: usize,
    pub check_interval: Duration,
    pub scale_up_multiplier: f64,
    pub scale_down_multiplier: f64,
    pub graceful_shutdown_timeout: Duration,
    pub process_startup_delay: Duration,
    pub redis: RedisConfig,
    pub rpc_port: u16,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    /// When set, the broker must be reachable at startup.
    pub strict_startup: bool,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env_var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("invalid value for {}: {:?}", key, raw))),
        None => Ok(default),
    }
}

fn env_duration_secs(key: &str, default_secs: f64) -> Result<Duration> {
    let secs: f64 = env_parse(key, default_secs)?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(AppError::Config(format!(
            "{} must be a positive number of seconds, got {}",
            key, secs
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}

impl Config {
    /// Load from the environment. Validation is fatal here; the
    /// supervisor refuses to start on a bad configuration.
    pub fn from_env() -> Result<Self> {
        let worker_command = match env_var("WORKER_COMMAND") {
            Some(raw) => WorkerCommand::parse(&raw)?,
            None => {
                return Err(AppError::Config(
                    "WORKER_COMMAND is required (executable plus arguments)".to_string(),
                ))
            }
        };

        let config = Self {
            queue_name: env_var("QUEUE_NAME").unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string()),
            worker_command,
            min_processes: env_parse("MIN_PROCESSES", DEFAULT_MIN_PROCESSES)?,
            max_processes: env_parse("MAX_PROCESSES", DEFAULT_MAX_PROCESSES)?,
            check_interval: env_duration_secs("CHECK_INTERVAL", DEFAULT_CHECK_INTERVAL_SECS)?,
            scale_up_multiplier: env_parse(
                "SCALE_UP_THRESHOLD_MULTIPLIER",
                DEFAULT_SCALE_UP_MULTIPLIER,
            )?,
            scale_down_multiplier: env_parse(
                "SCALE_DOWN_THRESHOLD_MULTIPLIER",
                DEFAULT_SCALE_DOWN_MULTIPLIER,
            )?,
            graceful_shutdown_timeout: env_duration_secs(
                "GRACEFUL_SHUTDOWN_TIMEOUT",
                DEFAULT_GRACEFUL_SHUTDOWN_SECS,
            )?,
            process_startup_delay: env_duration_secs(
                "PROCESS_STARTUP_DELAY",
                DEFAULT_PROCESS_STARTUP_DELAY_SECS,
            )?,
            redis: RedisConfig {
                host: env_var("REDIS_HOST").unwrap_or_else(|| DEFAULT_REDIS_HOST.to_string()),
                port: env_parse("REDIS_PORT", DEFAULT_REDIS_PORT)?,
                db: env_parse("REDIS_DB", 0)?,
                password: env_var("REDIS_PASSWORD"),
            },
            rpc_port: env_parse("QUEUEHERD_RPC_PORT", DEFAULT_RPC_PORT)?,
            log_level: env_var("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_file: env_var("LOG_FILE").map(PathBuf::from),
            strict_startup: env_parse("QUEUEHERD_STRICT_STARTUP", false)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_name.is_empty() {
            return Err(AppError::Config("QUEUE_NAME must not be empty".to_string()));
        }
        if self.min_processes == 0 {
            return Err(AppError::Config(
                "MIN_PROCESSES must be at least 1".to_string(),
            ));
        }
        if self.min_processes > self.max_processes {
            return Err(AppError::Config(format!(
                "MIN_PROCESSES ({}) must not exceed MAX_PROCESSES ({})",
                self.min_processes, self.max_processes
            )));
        }
        if self.scale_up_multiplier <= 0.0 || self.scale_down_multiplier <= 0.0 {
            return Err(AppError::Config(
                "scale threshold multipliers must be positive".to_string(),
            ));
        }
        if self.scale_down_multiplier >= self.scale_up_multiplier {
            return Err(AppError::Config(format!(
                "SCALE_DOWN_THRESHOLD_MULTIPLIER ({}) must be below \
                 SCALE_UP_THRESHOLD_MULTIPLIER ({})",
                self.scale_down_multiplier, self.scale_up_multiplier
            )));
        }
        if self.check_interval.is_zero()
            || self.graceful_shutdown_timeout.is_zero()
            || self.process_startup_delay.is_zero()
        {
            return Err(AppError::Config(
                "intervals and timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-attempt probe timeout: a third of the check interval, capped.
    pub fn probe_timeout(&self) -> Duration {
        std::cmp::min(self.check_interval / PROBE_TIMEOUT_DIVISOR, PROBE_TIMEOUT_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            queue_name: "tasks".to_string(),
            worker_command: WorkerCommand::parse("worker --queue tasks").unwrap(),
            min_processes: 1,
            max_processes: 5,
            check_interval: Duration::from_secs(1),
            scale_up_multiplier: 5.0,
            scale_down_multiplier: 2.5,
            graceful_shutdown_timeout: Duration::from_secs(30),
            process_startup_delay: Duration::from_secs(5),
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

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_zero_min_rejected() {
        let mut config = base_config();
        config.min_processes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_above_max_rejected() {
        let mut config = base_config();
        config.min_processes = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_multipliers_rejected() {
        let mut config = base_config();
        config.scale_down_multiplier = 5.0;
        config.scale_up_multiplier = 2.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_equal_multipliers_rejected() {
        let mut config = base_config();
        config.scale_down_multiplier = config.scale_up_multiplier;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = base_config();
        config.check_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_probe_timeout_is_fraction_of_interval() {
        let mut config = base_config();
        config.check_interval = Duration::from_secs(9);
        assert_eq!(config.probe_timeout(), Duration::from_secs(3));

        // Long intervals are capped so the probe never dawdles
        config.check_interval = Duration::from_secs(180);
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_redis_url_with_password() {
        let config = RedisConfig {
            host: "redis.internal".to_string(),
            port: 6380,
            db: 2,
            password: Some("hunter2".to_string()),
        };
        assert_eq!(config.url(), "redis://:hunter2@redis.internal:6380/2");
    }

    #[test]
    fn test_redis_url_without_password() {
        let config = RedisConfig {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        };
        assert_eq!(config.url(), "redis://localhost:6379/0");
    }
}
