//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `autoflow.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use autoflow_app::scheduler::SchedulerSettings;
use autoflow_app::settings::EngineSettings;
use autoflow_domain::rule::ActionType;
use autoflow_domain::run::MAX_RUN_BUDGET_SECS;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Execution limits and timeouts.
    pub engine: EngineConfig,
    /// Time-based trigger settings.
    pub scheduler: SchedulerConfig,
    /// In-process event and notice buses.
    pub bus: BusConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
    pub max_connections: u32,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Engine limits. Durations are whole seconds unless the name says otherwise.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_parallel_steps: usize,
    pub max_run_duration_secs: u64,
    pub default_action_timeout_secs: u64,
    pub ai_timeout_secs: u64,
    pub max_action_attempts: u32,
    pub retry_backoff_ms: u64,
    pub max_workflow_depth: usize,
    /// Per-action-type timeout overrides, keyed by action type name.
    pub action_timeouts_secs: HashMap<ActionType, u64>,
}

/// Scheduler configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Fire scheduled rules and templates. Overdue runs are reaped either way.
    pub enabled: bool,
    pub tick_secs: u64,
    /// Missed slots older than this are dropped after downtime.
    pub max_catch_up_secs: u64,
}

/// In-process channel sizing.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Events queued for dispatch before ingestion answers `503`, and
    /// notices buffered per realtime subscriber.
    pub capacity: usize,
}

impl Config {
    /// Load configuration from `autoflow.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if
    /// the resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("autoflow.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AUTOFLOW_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("AUTOFLOW_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("AUTOFLOW_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Ok(val) = std::env::var("AUTOFLOW_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("AUTOFLOW_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.server.port == 0, "port must be non-zero"),
            (
                self.database.max_connections == 0,
                "database.max_connections must be non-zero",
            ),
            (
                self.engine.max_run_duration_secs == 0,
                "engine.max_run_duration_secs must be non-zero",
            ),
            (
                self.engine.max_run_duration_secs > MAX_RUN_BUDGET_SECS,
                "engine.max_run_duration_secs must not exceed one week",
            ),
            (
                self.engine.max_parallel_steps == 0,
                "engine.max_parallel_steps must be non-zero",
            ),
            (
                self.engine.max_action_attempts == 0,
                "engine.max_action_attempts must be non-zero",
            ),
            (self.scheduler.tick_secs == 0, "scheduler.tick_secs must be non-zero"),
            (self.bus.capacity == 0, "bus.capacity must be non-zero"),
        ];
        match checks.into_iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::Validation(message.to_string())),
            None => Ok(()),
        }
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }
}

impl EngineConfig {
    #[must_use]
    pub fn to_settings(&self) -> EngineSettings {
        EngineSettings {
            max_parallel_steps: self.max_parallel_steps,
            max_run_duration: Duration::from_secs(self.max_run_duration_secs),
            default_action_timeout: Duration::from_secs(self.default_action_timeout_secs),
            ai_timeout: Duration::from_secs(self.ai_timeout_secs),
            action_timeouts: self
                .action_timeouts_secs
                .iter()
                .map(|(action_type, secs)| (*action_type, Duration::from_secs(*secs)))
                .collect(),
            max_action_attempts: self.max_action_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_workflow_depth: self.max_workflow_depth,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn to_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            tick: Duration::from_secs(self.tick_secs),
            max_catch_up: Duration::from_secs(self.max_catch_up_secs),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:autoflow.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "autoflowd=info,autoflow=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let defaults = EngineSettings::default();
        Self {
            max_parallel_steps: defaults.max_parallel_steps,
            max_run_duration_secs: defaults.max_run_duration.as_secs(),
            default_action_timeout_secs: defaults.default_action_timeout.as_secs(),
            ai_timeout_secs: defaults.ai_timeout.as_secs(),
            max_action_attempts: defaults.max_action_attempts,
            retry_backoff_ms: u64::try_from(defaults.retry_backoff.as_millis()).unwrap_or(u64::MAX),
            max_workflow_depth: defaults.max_workflow_depth,
            action_timeouts_secs: HashMap::new(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let defaults = SchedulerSettings::default();
        Self {
            enabled: true,
            tick_secs: defaults.tick.as_secs(),
            max_catch_up_secs: defaults.max_catch_up.as_secs(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.url, "sqlite:autoflow.db?mode=rwc");
        assert!(config.scheduler.enabled);
        assert_eq!(config.engine.max_parallel_steps, 8);
        assert_eq!(config.engine.max_run_duration_secs, 300);
        assert_eq!(config.engine.retry_backoff_ms, 200);
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.bus.capacity, 256);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [server]
            host = '127.0.0.1'
            port = 9090

            [database]
            url = 'sqlite:test.db'
            max_connections = 2

            [logging]
            filter = 'debug'

            [engine]
            max_parallel_steps = 4
            max_run_duration_secs = 60
            ai_timeout_secs = 10

            [engine.action_timeouts_secs]
            send_email = 12

            [scheduler]
            enabled = false
            tick_secs = 30

            [bus]
            capacity = 64
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.url, "sqlite:test.db");
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.engine.max_parallel_steps, 4);
        assert_eq!(config.engine.action_timeouts_secs[&ActionType::SendEmail], 12);
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.tick_secs, 30);
        assert_eq!(config.bus.capacity, 64);
    }

    #[test]
    fn should_convert_engine_section_to_settings() {
        let toml = "
            [engine]
            default_action_timeout_secs = 7
            retry_backoff_ms = 50

            [engine.action_timeouts_secs]
            invoke_ai = 45
        ";
        let config: Config = toml::from_str(toml).unwrap();
        let settings = config.engine.to_settings();
        assert_eq!(settings.default_action_timeout, Duration::from_secs(7));
        assert_eq!(settings.retry_backoff, Duration::from_millis(50));
        assert_eq!(settings.timeout_for(ActionType::InvokeAi), Duration::from_secs(45));
        assert_eq!(settings.timeout_for(ActionType::CreateTask), Duration::from_secs(7));
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn should_reject_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_tick() {
        let mut config = Config::default();
        config.scheduler.tick_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_run_budget() {
        let mut config = Config::default();
        config.engine.max_run_duration_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_run_budget_when_longer_than_a_week() {
        let mut config = Config::default();
        config.engine.max_run_duration_secs = u64::MAX;
        assert!(config.validate().is_err());

        config.engine.max_run_duration_secs = MAX_RUN_BUDGET_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_accept_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn should_format_custom_bind_addr() {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 9090;
        assert_eq!(config.bind_addr(), "127.0.0.1:9090");
    }

    #[test]
    fn should_report_parse_error_for_unknown_action_type() {
        let result: Result<Config, _> =
            toml::from_str("[engine.action_timeouts_secs]\nlaunch_rocket = 3");
        assert!(result.is_err());
    }
}
