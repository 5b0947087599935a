//! tickio configuration system
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (TICKIO_TICK_MS, TICKIO_CONCURRENCY, TICKIO_LOG)
//! 3. Config file (tickio.toml)
//! 4. Default values
//! ```
//!
//! # Example
//!
//! ```toml
//! [scheduler]
//! tick_ms = 10
//! default_priority = 0
//!
//! [workers]
//! concurrency = 4
//!
//! [log]
//! level = "info"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::scheduler::SchedulerConfig;
use crate::runtime::worker::WorkerConfig;
use crate::util::logger::LogLevel;

/// Environment variable overriding `scheduler.tick_ms`.
pub const ENV_TICK_MS: &str = "TICKIO_TICK_MS";
/// Environment variable overriding `workers.concurrency`.
pub const ENV_CONCURRENCY: &str = "TICKIO_CONCURRENCY";
/// Environment variable overriding `log.level`.
pub const ENV_LOG: &str = "TICKIO_LOG";

/// Default config file name.
pub const CONFIG_FILE: &str = "tickio.toml";

/// Full runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Run loop settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Worker pool settings
    #[serde(default)]
    pub workers: WorkerConfig,
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Maximum level emitted
    #[serde(default)]
    pub level: LogLevel,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl RuntimeConfig {
    /// Parse a TOML document. Missing sections and fields take defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.tick_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.tick_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by variable name.
    pub fn apply_overrides<F>(
        &mut self,
        lookup: F,
    ) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_TICK_MS) {
            self.scheduler.tick_ms = parse_env(ENV_TICK_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_CONCURRENCY) {
            self.workers.concurrency = parse_env(ENV_CONCURRENCY, &value)?;
        }
        if let Some(value) = lookup(ENV_LOG) {
            self.log.level = value
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("{}: {}", ENV_LOG, e)))?;
        }
        self.validate()
    }
}

fn parse_env<T: std::str::FromStr>(
    key: &str,
    value: &str,
) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} must be a number, got `{}`", key, value)))
}

/// Load configuration from a TOML file, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = RuntimeConfig::from_toml_str(&content)?;
    config.apply_env()?;
    Ok(config)
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_config_or_default(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    if path.exists() {
        return load_config(path);
    }
    let mut config = RuntimeConfig::default();
    config.apply_env()?;
    Ok(config)
}
