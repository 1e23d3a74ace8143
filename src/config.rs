//! Agent process configuration
//!
//! Read once at startup from a TOML file, then overridden from the
//! environment:
//!
//! ```toml
//! cache_dir = "/var/cache/converge"
//! interface = "eth0"
//! delegation_timeout_secs = 15
//! http_timeout_secs = 60
//! ```

use crate::error::{ConvergeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable overriding `cache_dir`
pub const ENV_CACHE_DIR: &str = "CONVERGE_CACHE_DIR";

/// Environment variable overriding `interface`
pub const ENV_INTERFACE: &str = "CONVERGE_INTERFACE";

pub const DEFAULT_CACHE_DIR: &str = "/var/cache/converge";
pub const DEFAULT_DELEGATION_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Root of the content-addressed cache
    pub cache_dir: PathBuf,

    /// Network interface hint handed to the transport layer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// Bound on a delegated remote apply
    pub delegation_timeout_secs: u64,

    /// Bound on a single HTTP source download
    pub http_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            interface: None,
            delegation_timeout_secs: DEFAULT_DELEGATION_TIMEOUT_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl AgentConfig {
    /// Config rooted at a specific cache directory, everything else default
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        AgentConfig {
            cache_dir: cache_dir.into(),
            ..Default::default()
        }
    }

    /// Parse config from a TOML string
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AgentConfig =
            toml::from_str(text).map_err(|e| ConvergeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file and apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading agent config from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `CONVERGE_CACHE_DIR` / `CONVERGE_INTERFACE` overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_CACHE_DIR).ok(),
            std::env::var(ENV_INTERFACE).ok(),
        );
    }

    fn apply_overrides(&mut self, cache_dir: Option<String>, interface: Option<String>) {
        if let Some(dir) = cache_dir.filter(|d| !d.trim().is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(iface) = interface.filter(|i| !i.trim().is_empty()) {
            self.interface = Some(iface);
        }
    }

    /// Validate invariants
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConvergeError::Config("cache_dir cannot be empty".to_string()));
        }
        if self.delegation_timeout_secs == 0 {
            return Err(ConvergeError::Config(
                "delegation_timeout_secs must be positive".to_string(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConvergeError::Config(
                "http_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn delegation_timeout(&self) -> Duration {
        Duration::from_secs(self.delegation_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
