//! Configuration loading for Mosaic Store
//!
//! Configuration is read from a TOML file; every field carries a default
//! so a partial (or missing) file yields a working setup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::DEFAULT_MAX_FRAME_LENGTH;
use crate::types::{Result, StoreError};

/// Top-level store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Command-stream loading configuration
    #[serde(default)]
    pub load: LoadConfig,
}

/// Command-stream loading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Fail the load on unknown command bytes and unresolvable component
    /// types instead of warning and continuing
    #[serde(default = "default_strict")]
    pub strict: bool,

    /// Maximum accepted payload length for a single frame, in bytes
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: u32,
}

fn default_strict() -> bool {
    false
}

fn default_max_frame_length() -> u32 {
    DEFAULT_MAX_FRAME_LENGTH
}

impl Default for LoadConfig {
    fn default() -> Self {
        LoadConfig {
            strict: default_strict(),
            max_frame_length: default_max_frame_length(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    let config: Config =
        toml::from_str(&contents).map_err(|e| StoreError::Config(e.to_string()))?;
    info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// Load configuration, falling back to defaults when the file is missing
/// or malformed
pub fn load_config_or_default(path: impl AsRef<Path>) -> Config {
    let path = path.as_ref();
    match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "using default configuration");
            Config::default()
        }
    }
}
