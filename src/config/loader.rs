// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    ///
    /// The result is not validated yet: environment overrides are applied on
    /// top of it first.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RecorderConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;

        Self::parse(&content)
    }

    /// Parse YAML content after substituting environment variables
    pub fn parse(content: &str) -> Result<RecorderConfig> {
        let content = Self::substitute_env_vars(content);

        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${DATA_PATH} -> /data
    /// - ${POLL_INTERVAL:-5000} -> 5000 (if POLL_INTERVAL not set)
    pub(crate) fn substitute_env_vars(content: &str) -> String {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("static regex is valid");

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    // Unset with no default: substitute nothing so optional
                    // settings stay empty instead of carrying the placeholder
                    None => String::new(),
                },
            }
        })
        .to_string()
    }

    /// Apply environment overrides using `lookup` to read variables
    pub fn apply_env_overrides<F>(config: &mut RecorderConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(devices) = lookup("DEVICES") {
            config.devices = parse_device_list(&devices);
        }

        if let Some(interval) = lookup("POLL_INTERVAL") {
            config.polling.interval_ms = interval
                .trim()
                .parse()
                .with_context(|| format!("POLL_INTERVAL must be a number of milliseconds, got '{}'", interval))?;
        }

        if let Some(data_path) = lookup("DATA_PATH") {
            config.storage.filesystem_mut().base_path = data_path;
        }

        let influx_vars = [
            "INFLUX_URL",
            "INFLUX_TOKEN",
            "INFLUX_ORG",
            "INFLUX_BUCKET",
            "INFLUX_ERROR_BUCKET",
        ];
        if influx_vars.iter().any(|key| lookup(key).is_some()) {
            let influx = config.storage.influxdb_mut();
            if let Some(url) = lookup("INFLUX_URL") {
                influx.url = url;
            }
            if let Some(token) = lookup("INFLUX_TOKEN") {
                influx.token = token;
            }
            if let Some(org) = lookup("INFLUX_ORG") {
                influx.org = org;
            }
            if let Some(bucket) = lookup("INFLUX_BUCKET") {
                influx.bucket = bucket;
            }
            if let Some(error_bucket) = lookup("INFLUX_ERROR_BUCKET") {
                influx.error_bucket = Some(error_bucket);
            }
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(config: &RecorderConfig) -> Result<()> {
        if config.devices.iter().all(|d| d.trim().is_empty()) {
            bail!("No devices configured. Set DEVICES to a comma-separated list of device addresses");
        }

        if config.polling.interval_ms == 0 {
            bail!("polling.interval_ms must be > 0");
        }

        if config.polling.request_timeout_seconds == 0 {
            bail!("polling.request_timeout_seconds must be > 0");
        }

        config.storage.selection()?;

        Ok(())
    }
}

/// Split a comma-separated device list, trimming entries and dropping empty ones
pub fn parse_device_list(devices: &str) -> Vec<String> {
    devices
        .split(',')
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .collect()
}
