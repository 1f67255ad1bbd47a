use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::CampusError;
use crate::utils::{get_env_with_prefix, parse_env_with_prefix};

#[cfg(feature = "database")]
use crate::database::DatabaseConfig;

/// Main configuration for a campus-ledger service
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub dev: DevConfig,
    /// JSON file replacing the built-in plan catalog
    #[serde(default)]
    pub plans_file: Option<String>,
    /// Database settings; the in-memory store is used when absent
    #[cfg(feature = "database")]
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body size in bytes (default: 1MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

/// Lifecycle scheduler settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Run the scheduler inside the server process
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    /// Seconds between ticks (default: 30 minutes)
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// Rows fetched per batch in each pass
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Development mode configuration
///
/// In dev mode, 5xx responses carry the full error message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevConfig {
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            interval_seconds: default_interval_seconds(),
            batch_size: default_batch_size(),
        }
    }
}

impl SchedulerConfig {
    /// Load scheduler configuration from environment variables
    ///
    /// - `CAMPUS_SCHEDULER_ENABLED` (default: true)
    /// - `CAMPUS_SCHEDULER_INTERVAL_SECONDS` (default: 1800)
    /// - `CAMPUS_SCHEDULER_BATCH_SIZE` (default: 500)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = parse_env_with_prefix("SCHEDULER_ENABLED") {
            config.enabled = enabled;
        }
        if let Some(interval) = parse_env_with_prefix("SCHEDULER_INTERVAL_SECONDS") {
            config.interval_seconds = interval;
        }
        if let Some(batch_size) = parse_env_with_prefix("SCHEDULER_BATCH_SIZE") {
            config.batch_size = batch_size;
        }

        config
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl DevConfig {
    /// `CAMPUS_DEV_MODE` (default: false)
    pub fn from_env() -> Self {
        Self {
            enabled: parse_env_with_prefix("DEV_MODE").unwrap_or(false),
        }
    }

    pub fn is_dev_mode(&self) -> bool {
        self.enabled
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_interval_seconds() -> u64 {
    30 * 60
}

fn default_batch_size() -> usize {
    crate::subscriptions::scheduler::DEFAULT_BATCH_SIZE
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.config.server.max_body_size = max_body_size;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.config.scheduler = scheduler;
        self
    }

    pub fn with_scheduler_enabled(mut self, enabled: bool) -> Self {
        self.config.scheduler.enabled = enabled;
        self
    }

    pub fn with_plans_file(mut self, path: impl Into<String>) -> Self {
        self.config.plans_file = Some(path.into());
        self
    }

    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.config.dev.enabled = enabled;
        self
    }

    #[cfg(feature = "database")]
    pub fn with_database(mut self, database: DatabaseConfig) -> Self {
        self.config.database = Some(database);
        self
    }

    /// Load configuration from environment variables with CAMPUS_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(host) = get_env_with_prefix("HOST") {
            self.config.server.host = host;
        }
        // CAMPUS_PORT first, then PORT (for platform compatibility)
        if let Some(port) = parse_env_with_prefix("PORT") {
            self.config.server.port = port;
        }
        if let Some(max_body_size) = parse_env_with_prefix("MAX_BODY_SIZE") {
            self.config.server.max_body_size = max_body_size;
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }
        if let Some(path) = get_env_with_prefix("PLANS_FILE") {
            self.config.plans_file = Some(path);
        }

        self.config.scheduler = SchedulerConfig::from_env();
        self.config.dev = DevConfig::from_env();

        #[cfg(feature = "database")]
        if let Some(url) = get_env_with_prefix("DATABASE_URL") {
            self.config.database = Some(
                DatabaseConfig {
                    url,
                    ..Default::default()
                }
                .with_env_overrides(),
            );
        }

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration is invalid:
    /// - Invalid server address (host:port)
    /// - Invalid log level
    /// - Zero scheduler interval or batch size
    pub fn build(self) -> crate::error::Result<Config> {
        self.config.server.addr().map_err(|e| {
            CampusError::bad_request(format!(
                "Invalid server address {}:{} - {}",
                self.config.server.host, self.config.server.port, e
            ))
        })?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(CampusError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if self.config.server.port == 0 {
            return Err(CampusError::bad_request("Server port must be greater than 0"));
        }

        if self.config.server.max_body_size == 0 {
            return Err(CampusError::bad_request(
                "Maximum body size must be greater than 0",
            ));
        }

        if self.config.scheduler.interval_seconds == 0 {
            return Err(CampusError::bad_request(
                "Scheduler interval must be greater than 0",
            ));
        }

        if self.config.scheduler.batch_size == 0 {
            return Err(CampusError::bad_request(
                "Scheduler batch size must be greater than 0",
            ));
        }

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Load the plan catalog: the configured JSON file, or the built-in tiers.
    pub fn load_plan_catalog(&self) -> crate::error::Result<crate::plans::PlanCatalog> {
        match &self.plans_file {
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|e| {
                    CampusError::internal(format!("Failed to read plans file {path}: {e}"))
                })?;
                let catalog = crate::plans::PlanCatalog::from_json(&json)?;
                tracing::info!(path = %path, plans = catalog.len(), "Loaded plan catalog");
                Ok(catalog)
            }
            None => Ok(crate::plans::PlanCatalog::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.interval(), Duration::from_secs(1800));
        assert_eq!(config.scheduler.batch_size, 500);
        assert_eq!(config.load_plan_catalog().unwrap().len(), 3);
    }

    #[test]
    fn test_validation() {
        assert!(ConfigBuilder::new().with_log_level("loud").build().is_err());
        assert!(ConfigBuilder::new().with_port(0).build().is_err());
        assert!(
            ConfigBuilder::new()
                .with_scheduler(SchedulerConfig {
                    interval_seconds: 0,
                    ..Default::default()
                })
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_missing_plans_file() {
        let config = ConfigBuilder::new()
            .with_plans_file("/nonexistent/plans.json")
            .build()
            .unwrap();
        assert!(config.load_plan_catalog().is_err());
    }

    #[test]
    fn test_scheduler_from_env() {
        unsafe {
            std::env::set_var("CAMPUS_SCHEDULER_INTERVAL_SECONDS", "60");
            std::env::set_var("CAMPUS_SCHEDULER_ENABLED", "false");
        }
        let scheduler = SchedulerConfig::from_env();
        assert_eq!(scheduler.interval_seconds, 60);
        assert!(!scheduler.enabled);
        unsafe {
            std::env::remove_var("CAMPUS_SCHEDULER_INTERVAL_SECONDS");
            std::env::remove_var("CAMPUS_SCHEDULER_ENABLED");
        }
    }
}
