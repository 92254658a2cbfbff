use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::{AppError, Result};
use crate::jobs::JobsConfig;
use crate::notifications::NotifyConfig;
use crate::utils::{get_env_with_prefix, parse_env_with_prefix};

#[cfg(feature = "database")]
use crate::database::DatabaseConfig;

/// Process-wide configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub notify: NotifyConfig,
    pub jobs: JobsConfig,
    /// `None` runs every store in memory
    #[cfg(feature = "database")]
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Notifications are small; anything near this limit is not from Adyen
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
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
            json: default_json(),
        }
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

fn default_json() -> bool {
    false
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

impl ServerConfig {
    pub fn addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// Builder for [`Config`], layering explicit settings over the environment
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
    /// Environment values that could not be parsed, reported by `build()`
    env_errors: Vec<String>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            env_errors: Vec::new(),
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

    pub fn with_notify(mut self, notify: NotifyConfig) -> Self {
        self.config.notify = notify;
        self
    }

    pub fn with_jobs_config(mut self, jobs: JobsConfig) -> Self {
        self.config.jobs = jobs;
        self
    }

    #[cfg(feature = "database")]
    pub fn with_database(mut self, database: DatabaseConfig) -> Self {
        self.config.database = Some(database);
        self
    }

    /// Load every section from `ADYEN_`-prefixed (or bare) environment variables
    pub fn from_env(mut self) -> Self {
        if let Some(host) = get_env_with_prefix("HOST") {
            self.config.server.host = host;
        }
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
            match parse_log_json(&json) {
                Some(enabled) => self.config.logging.json = enabled,
                None => self
                    .env_errors
                    .push(format!("LOG_JSON must be true or false, got {:?}", json)),
            }
        }

        self.config.notify = NotifyConfig::from_env();
        self.config.jobs = JobsConfig::from_env();

        #[cfg(feature = "database")]
        {
            self.config.database = DatabaseConfig::from_env();
        }

        self
    }

    /// Validate and return the configuration
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an unparsable environment value, an
    /// unparsable listen address, an unknown log level, a zero port or body
    /// limit, or incomplete webhook settings.
    pub fn build(self) -> Result<Config> {
        if !self.env_errors.is_empty() {
            return Err(AppError::bad_request(format!(
                "Invalid environment: {}",
                self.env_errors.join("; ")
            )));
        }

        let server = &self.config.server;
        server.addr().map_err(|e| {
            AppError::bad_request(format!(
                "Invalid server address {}:{} - {}",
                server.host, server.port, e
            ))
        })?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(AppError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if server.port == 0 {
            return Err(AppError::bad_request("Server port must be greater than 0"));
        }

        if server.max_body_size == 0 {
            return Err(AppError::bad_request(
                "Maximum body size must be greater than 0",
            ));
        }

        if self.config.jobs.enabled && self.config.jobs.worker_count == 0 {
            return Err(AppError::bad_request(
                "Job worker count must be greater than 0 when jobs are enabled",
            ));
        }

        self.config.notify.validate()?;

        Ok(self.config)
    }
}

/// `true`/`false`, case-insensitive
pub(crate) fn parse_log_json(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
