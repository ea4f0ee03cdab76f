use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::screening::FailurePolicy;

const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SCREENING_TIMEOUT_SECS: u64 = 300;
const DEFAULT_BATCH_SIZE: usize = 5;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub screening: ScreeningConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let ansi = env::var("APP_LOG_ANSI")
            .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level, ansi },
            screening: ScreeningConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub ansi: bool,
}

/// Timeouts, failure handling, and background batching for screenings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreeningConfig {
    pub stage_timeout: Duration,
    /// `None` disables the whole-screening deadline.
    pub screening_timeout: Option<Duration>,
    pub failure_policy: FailurePolicy,
    pub batch_size: usize,
    pub poll_interval: Duration,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
            screening_timeout: Some(Duration::from_secs(DEFAULT_SCREENING_TIMEOUT_SECS)),
            failure_policy: FailurePolicy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl ScreeningConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let stage_timeout = read_secs("SCREENING_STAGE_TIMEOUT_SECS", DEFAULT_STAGE_TIMEOUT_SECS)?;
        if stage_timeout == 0 {
            return Err(ConfigError::InvalidNumber {
                variable: "SCREENING_STAGE_TIMEOUT_SECS",
            });
        }

        let screening_timeout =
            match read_secs("SCREENING_TIMEOUT_SECS", DEFAULT_SCREENING_TIMEOUT_SECS)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };

        let failure_policy = match env::var("SCREENING_FAILURE_POLICY") {
            Ok(value) => FailurePolicy::parse(&value)
                .ok_or(ConfigError::InvalidFailurePolicy(value))?,
            Err(_) => FailurePolicy::default(),
        };

        let batch_size = read_secs("SCREENING_BATCH_SIZE", DEFAULT_BATCH_SIZE as u64)? as usize;
        if batch_size == 0 {
            return Err(ConfigError::InvalidNumber {
                variable: "SCREENING_BATCH_SIZE",
            });
        }

        let poll_interval =
            read_secs("SCREENING_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?.max(1);

        Ok(Self {
            stage_timeout: Duration::from_secs(stage_timeout),
            screening_timeout,
            failure_policy,
            batch_size,
            poll_interval: Duration::from_secs(poll_interval),
        })
    }
}

fn read_secs(variable: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(variable) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { variable }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str },
    InvalidFailurePolicy(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} must be a positive whole number")
            }
            ConfigError::InvalidFailurePolicy(value) => write!(
                f,
                "SCREENING_FAILURE_POLICY must be `best_effort` or `fail_fast`, got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidFailurePolicy(_) => None,
        }
    }
}

/// Serializes tests that read or write process environment variables.
#[cfg(test)]
pub(crate) fn env_guard() -> &'static std::sync::Mutex<()> {
    static GUARD: std::sync::OnceLock<std::sync::Mutex<()>> = std::sync::OnceLock::new();
    GUARD.get_or_init(|| std::sync::Mutex::new(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn reset_env() {
        for variable in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LOG_ANSI",
            "SCREENING_STAGE_TIMEOUT_SECS",
            "SCREENING_TIMEOUT_SECS",
            "SCREENING_FAILURE_POLICY",
            "SCREENING_BATCH_SIZE",
            "SCREENING_POLL_INTERVAL_SECS",
        ] {
            env::remove_var(variable);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(!config.telemetry.ansi);
        assert_eq!(config.screening, ScreeningConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn screening_overrides_are_applied() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SCREENING_STAGE_TIMEOUT_SECS", "5");
        env::set_var("SCREENING_TIMEOUT_SECS", "0");
        env::set_var("SCREENING_FAILURE_POLICY", "fail-fast");
        env::set_var("SCREENING_BATCH_SIZE", "12");
        let config = AppConfig::load().expect("config loads");
        reset_env();

        assert_eq!(config.screening.stage_timeout, Duration::from_secs(5));
        assert_eq!(config.screening.screening_timeout, None);
        assert_eq!(config.screening.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.screening.batch_size, 12);
    }

    #[test]
    fn rejects_unknown_failure_policy() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SCREENING_FAILURE_POLICY", "retry_forever");
        let err = AppConfig::load().expect_err("policy rejected");
        reset_env();
        assert!(matches!(err, ConfigError::InvalidFailurePolicy(ref value) if value == "retry_forever"));
    }

    #[test]
    fn rejects_zero_stage_timeout() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SCREENING_STAGE_TIMEOUT_SECS", "0");
        let err = AppConfig::load().expect_err("zero timeout rejected");
        reset_env();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                variable: "SCREENING_STAGE_TIMEOUT_SECS"
            }
        ));
    }
}
