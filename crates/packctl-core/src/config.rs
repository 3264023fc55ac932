//! User configuration
//!
//! Stored in `~/.config/packctl/config.yaml`. Every field is optional; missing
//! fields fall back to the built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::request::PollSettings;

/// Environment variable overriding the default namespace
pub const NAMESPACE_ENV: &str = "PACKCTL_NAMESPACE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackctlConfig {
    /// Namespace used when none is given on the command line
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Interval between reconciliation status checks
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Give up waiting for reconciliation after this long
    #[serde(default = "default_poll_timeout", with = "humantime_serde")]
    pub poll_timeout: Duration,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_poll_interval() -> Duration {
    PollSettings::default().interval
}

fn default_poll_timeout() -> Duration {
    PollSettings::default().timeout
}

impl Default for PackctlConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            poll_interval: default_poll_interval(),
            poll_timeout: default_poll_timeout(),
        }
    }
}

impl PackctlConfig {
    /// Load configuration from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env(std::env::var(NAMESPACE_ENV).ok());
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| CoreError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("packctl").join("config.yaml"))
    }

    fn apply_env(&mut self, namespace: Option<String>) {
        if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
            self.namespace = ns;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(CoreError::MissingField {
                field: "namespace".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(CoreError::InvalidConfig {
                message: "pollInterval must be greater than zero".to_string(),
            });
        }
        if self.poll_timeout < self.poll_interval {
            return Err(CoreError::InvalidConfig {
                message: "pollTimeout must not be shorter than pollInterval".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings::new(self.poll_interval, self.poll_timeout)
    }
}
