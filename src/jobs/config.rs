//! Configuration for the background job system

use crate::utils::{get_env_with_prefix, parse_env_with_prefix};
use serde::{Deserialize, Serialize};

/// Job queue backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobBackend {
    /// In-memory queue; scheduled reconciliations are lost on restart
    #[default]
    InMemory,
    /// `background_jobs` table in the configured database
    #[cfg(feature = "database")]
    Database,
}

/// Configuration for background jobs
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JobsConfig {
    /// Run workers in this process
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub backend: JobBackend,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Maximum number of retries for failed jobs
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base retry backoff in seconds (exponential backoff: base * 2^retry_count)
    #[serde(default = "default_retry_backoff_seconds")]
    pub retry_backoff_seconds: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            backend: JobBackend::default(),
            worker_count: default_worker_count(),
            max_retries: default_max_retries(),
            retry_backoff_seconds: default_retry_backoff_seconds(),
        }
    }
}

impl JobsConfig {
    /// Load jobs configuration from environment variables
    ///
    /// `JOBS_BACKEND` defaults to `database` when `DATABASE_URL` is set.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = get_env_with_prefix("JOBS_ENABLED") {
            config.enabled = enabled.parse().unwrap_or(true);
        }

        #[cfg(feature = "database")]
        if get_env_with_prefix("DATABASE_URL").is_some() {
            config.backend = JobBackend::Database;
        }

        if let Some(backend) = get_env_with_prefix("JOBS_BACKEND") {
            config.backend = match backend.to_lowercase().as_str() {
                #[cfg(feature = "database")]
                "database" | "db" => JobBackend::Database,
                _ => JobBackend::InMemory,
            };
        }

        if let Some(count) = parse_env_with_prefix("JOBS_WORKER_COUNT") {
            config.worker_count = count;
        }

        if let Some(retries) = parse_env_with_prefix("JOBS_MAX_RETRIES") {
            config.max_retries = retries;
        }

        if let Some(backoff) = parse_env_with_prefix("JOBS_RETRY_BACKOFF_SECONDS") {
            config.retry_backoff_seconds = backoff;
        }

        config
    }
}

fn default_enabled() -> bool {
    true
}

fn default_worker_count() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_seconds() -> u64 {
    60
}
