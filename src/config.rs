//! Bridge configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! is a valid configuration.

use crate::gfx::DEFAULT_MAX_CONTEXTS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Host-side settings shared by every module a [`Loader`](crate::Loader) creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum live graphics contexts per module instance.
    pub max_contexts: usize,
    /// Fuel granted to each call into an artifact. `None` disables metering.
    pub fuel_per_call: Option<u64>,
    /// Frames per second requested by the frame driver.
    pub refresh_hz: u32,
    /// `tracing` filter directive used by the CLI.
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_contexts: DEFAULT_MAX_CONTEXTS,
            fuel_per_call: None,
            refresh_hz: 60,
            log_filter: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_contexts == 0 {
            return Err(ConfigError::Invalid("max_contexts must be at least 1".into()));
        }
        if self.refresh_hz == 0 {
            return Err(ConfigError::Invalid("refresh_hz must be at least 1".into()));
        }
        if self.fuel_per_call == Some(0) {
            return Err(ConfigError::Invalid("fuel_per_call must be positive".into()));
        }
        Ok(())
    }
}
