//! Configuration management for keystat
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `KEYSTAT_*` environment variables. Every field has a documented default so
//! the collector runs with nothing but a DSN and a service name.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::{KeystatError, Result, RetentionPolicy, TimePrecision};

/// Name of the retention policy created with a new database
pub const DEFAULT_RETENTION_POLICY_NAME: &str = "keystat_default";

pub const ENV_REGISTRY_HOST: &str = "KEYSTAT_REGISTRY_HOST";
pub const ENV_REGISTRY_PORT: &str = "KEYSTAT_REGISTRY_PORT";
pub const ENV_RETENTION_DURATION: &str = "KEYSTAT_RETENTION_DURATION";
pub const ENV_RETENTION_REPLICATION: &str = "KEYSTAT_RETENTION_REPLICATION";
pub const ENV_TIME_PRECISION: &str = "KEYSTAT_TIME_PRECISION";
pub const ENV_STORE_TIMEOUT_SECS: &str = "KEYSTAT_STORE_TIMEOUT_SECS";
pub const ENV_WRITE_ATTEMPTS: &str = "KEYSTAT_WRITE_ATTEMPTS";
pub const ENV_MAX_CONCURRENCY: &str = "KEYSTAT_MAX_CONCURRENCY";

/// Collector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Host of the service registry agent
    #[serde(default = "default_registry_host")]
    pub registry_host: String,

    /// HTTP port of the service registry agent
    #[serde(default = "default_registry_port")]
    pub registry_port: u16,

    /// Duration of the retention policy created with a new database
    #[serde(default = "default_retention_duration")]
    pub retention_duration: String,

    /// Replication factor of that retention policy
    #[serde(default = "default_retention_replication")]
    pub retention_replication: u32,

    /// Timestamp precision used on write
    #[serde(default)]
    pub time_precision: TimePrecision,

    /// Per-request timeout when reading instance statistics
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,

    /// Attempts per batch write before the batch is given up
    #[serde(default = "default_write_attempts")]
    pub write_attempts: usize,

    /// Instances of one service processed at once (1 = sequential)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

// Default value providers
fn default_registry_host() -> String {
    "localhost".to_string()
}

fn default_registry_port() -> u16 {
    8500
}

fn default_retention_duration() -> String {
    "30d".to_string()
}

fn default_retention_replication() -> u32 {
    1
}

fn default_store_timeout_secs() -> u64 {
    5
}

fn default_write_attempts() -> usize {
    3
}

fn default_max_concurrency() -> usize {
    1
}

impl CollectorConfig {
    /// Load configuration from a TOML file, or use defaults when no file is given
    ///
    /// Values are not validated here; `with_overrides` validates the layered
    /// result, so the environment can still correct a file setting.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content).map_err(|e| {
                    KeystatError::Configuration(format!(
                        "Failed to parse config file {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
            None => Self::default(),
        };
        Ok(config)
    }

    /// Apply `KEYSTAT_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_REGISTRY_HOST) {
            self.registry_host = host;
        }
        if let Some(port) = lookup(ENV_REGISTRY_PORT) {
            self.registry_port = parse_var(ENV_REGISTRY_PORT, &port)?;
        }
        if let Some(duration) = lookup(ENV_RETENTION_DURATION) {
            self.retention_duration = duration;
        }
        if let Some(replication) = lookup(ENV_RETENTION_REPLICATION) {
            self.retention_replication = parse_var(ENV_RETENTION_REPLICATION, &replication)?;
        }
        if let Some(precision) = lookup(ENV_TIME_PRECISION) {
            self.time_precision = precision.parse().map_err(|e| {
                KeystatError::Configuration(format!("{}: {}", ENV_TIME_PRECISION, e))
            })?;
        }
        if let Some(timeout) = lookup(ENV_STORE_TIMEOUT_SECS) {
            self.store_timeout_secs = parse_var(ENV_STORE_TIMEOUT_SECS, &timeout)?;
        }
        if let Some(attempts) = lookup(ENV_WRITE_ATTEMPTS) {
            self.write_attempts = parse_var(ENV_WRITE_ATTEMPTS, &attempts)?;
        }
        if let Some(concurrency) = lookup(ENV_MAX_CONCURRENCY) {
            self.max_concurrency = parse_var(ENV_MAX_CONCURRENCY, &concurrency)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.registry_host.trim().is_empty() {
            return Err(KeystatError::Configuration(
                "registry host must not be empty".to_string(),
            ));
        }
        if self.retention_duration.trim().is_empty() {
            return Err(KeystatError::Configuration(
                "retention duration must not be empty".to_string(),
            ));
        }
        if self.retention_replication == 0 {
            return Err(KeystatError::Configuration(
                "retention replication must be at least 1".to_string(),
            ));
        }
        if self.write_attempts == 0 {
            return Err(KeystatError::Configuration(
                "write attempts must be at least 1".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(KeystatError::Configuration(
                "max concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Retention policy to create with a new database
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            name: DEFAULT_RETENTION_POLICY_NAME.to_string(),
            duration: self.retention_duration.clone(),
            replication: self.retention_replication,
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        KeystatError::Configuration(format!("{}: invalid value {:?}: {}", key, value, e))
    })
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            registry_host: default_registry_host(),
            registry_port: default_registry_port(),
            retention_duration: default_retention_duration(),
            retention_replication: default_retention_replication(),
            time_precision: TimePrecision::default(),
            store_timeout_secs: default_store_timeout_secs(),
            write_attempts: default_write_attempts(),
            max_concurrency: default_max_concurrency(),
        }
    }
}
