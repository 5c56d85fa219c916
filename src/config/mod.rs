// Configuration module for homewizard-recorder
//
// Provides:
// - YAML configuration file loading
// - Environment variable substitution and overrides
// - Configuration validation and storage backend selection
// - Default values

pub mod types;
mod loader;

pub use types::*;
pub use loader::{parse_device_list, ConfigLoader};

use anyhow::{Context, Result};
use std::path::Path;

/// Load and validate configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RecorderConfig> {
    let config = ConfigLoader::load(path).context("Failed to load configuration")?;
    ConfigLoader::validate(&config)?;
    Ok(config)
}

/// Load configuration from an optional file plus process environment overrides
///
/// Without a file the configuration comes from the environment alone
/// (`DEVICES`, `POLL_INTERVAL`, `DATA_PATH`, `INFLUX_*`, `LOG_LEVEL`).
pub fn load_config_with_env<P: AsRef<Path>>(path: Option<P>) -> Result<RecorderConfig> {
    let mut config = match path {
        Some(path) => ConfigLoader::load(path).context("Failed to load configuration")?,
        None => RecorderConfig::default(),
    };

    ConfigLoader::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    ConfigLoader::validate(&config)?;

    Ok(config)
}
