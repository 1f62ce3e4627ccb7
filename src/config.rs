//! Server configuration.
//!
//! Every field has a default so an empty (or missing) file is a valid
//! configuration. The file is YAML; `LISTEN` overrides the listen address.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the YAML configuration file.
pub const CONFIG_ENV: &str = "HTTP_SVR_CONFIG";

/// Environment variable overriding `server.listen_addr`.
pub const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub idle: IdleConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Size of the connection-state pool; one slot per live connection.
    pub max_connections: usize,
}

/// Idle-connection reaping.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Connections inactive for longer than this are closed.
    pub idle_timeout_secs: u64,
    /// How often the reaper sweeps.
    pub reap_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_head_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            max_connections: 1024,
        }
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 3600,
            reap_interval_secs: 60,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_head_bytes: 80 * 1024,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

impl IdleConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

impl Config {
    /// Loads the configuration named by `HTTP_SVR_CONFIG`, or the defaults
    /// when the variable is unset. `LISTEN` is applied on top either way.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(addr) = std::env::var(LISTEN_ENV) {
            cfg.server.listen_addr = addr;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        // serde_yaml rejects an empty document, treat it as all defaults.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_connections == 0 {
            return Err(ConfigError::Invalid("server.max_connections must be > 0"));
        }
        if self.idle.reap_interval_secs == 0 {
            return Err(ConfigError::Invalid("idle.reap_interval_secs must be > 0"));
        }
        if self.limits.max_head_bytes == 0 {
            return Err(ConfigError::Invalid("limits.max_head_bytes must be > 0"));
        }
        Ok(())
    }
}
