//! Configuration file support for dvslib tools
//!
//! Loads Redis connection settings and default polling behaviour from TOML.
//! Default location: /etc/sonic/dvslib.toml

use crate::error::{DvsError, DvsResult};
use crate::polling::PollingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/dvslib.toml";

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Redis host
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

/// Default polling behaviour for waits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingSettings {
    /// Delay between reads in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Total wait in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Require two consecutive matching reads
    #[serde(default = "default_strict")]
    pub strict: bool,
}

/// Complete dvslib configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvsConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Polling configuration
    #[serde(default)]
    pub polling: PollingSettings,
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_interval_ms() -> u64 {
    crate::polling::DEFAULT_POLLING_INTERVAL.as_millis() as u64
}

fn default_timeout_ms() -> u64 {
    crate::polling::DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_strict() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            connection_timeout_secs: default_connection_timeout(),
        }
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
            strict: default_strict(),
        }
    }
}

impl PollingSettings {
    /// Converts to a validated [`PollingConfig`].
    pub fn to_polling_config(&self) -> DvsResult<PollingConfig> {
        let config = PollingConfig::new(
            Duration::from_millis(self.interval_ms),
            Duration::from_millis(self.timeout_ms),
            self.strict,
        );
        config.validate()?;
        Ok(config)
    }
}

impl DvsConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> DvsResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| DvsError::Config(format!("Failed to parse config: {}", e)))?;
        config.polling.to_polling_config()?;
        Ok(config)
    }

    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> DvsResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content).map_err(|e| match e {
                DvsError::Config(msg) => {
                    DvsError::Config(format!("{}: {}", path.display(), msg))
                }
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(DvsError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> DvsResult<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Get connection timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connection_timeout_secs)
    }
}
