//! Router configuration, loaded from JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::envelope::EnvelopeFormat;
use crate::error::ConfigError;

/// Largest party list the native bridge accepts.
pub const DEFAULT_MAX_PARTIES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub log_dir: PathBuf,
    pub json_logs: bool,
    /// Records kept by the audit trail before the oldest is evicted.
    pub audit_capacity: usize,
    pub max_parties: usize,
    pub envelope_format: EnvelopeFormat,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            log_dir: PathBuf::from("logs"),
            json_logs: false,
            audit_capacity: 500,
            max_parties: DEFAULT_MAX_PARTIES,
            envelope_format: EnvelopeFormat::AddressedMap,
        }
    }
}

impl RouterConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parties < 2 {
            return Err(ConfigError::Invalid(format!(
                "max_parties must be at least 2, found: {}",
                self.max_parties
            )));
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("log_dir cannot be empty".into()));
        }
        Ok(())
    }
}
