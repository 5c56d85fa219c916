// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Configuration types for homewizard-recorder

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecorderConfig {
    /// Device identities (IP address or hostname) to poll
    #[serde(default)]
    pub devices: Vec<String>,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    /// Fixed poll interval in milliseconds, shared by all devices
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Per-request timeout for device HTTP calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Storage configuration
///
/// Both sections may be present; [`StorageConfig::selection`] decides which
/// one services the run.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub influxdb: Option<InfluxDbConfig>,

    #[serde(default)]
    pub filesystem: Option<FilesystemConfig>,
}

/// The backend chosen for a run. Fixed at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageSelection {
    InfluxDb(InfluxDbConfig),
    Filesystem(FilesystemConfig),
}

impl StorageSelection {
    pub fn name(&self) -> &'static str {
        match self {
            StorageSelection::InfluxDb(_) => "InfluxDB",
            StorageSelection::Filesystem(_) => "Local File Storage",
        }
    }
}

impl StorageConfig {
    /// Pick the storage backend: a complete InfluxDB configuration wins,
    /// otherwise a configured data path, otherwise an error.
    pub fn selection(&self) -> Result<StorageSelection> {
        if let Some(influx) = self.influxdb.as_ref().filter(|c| c.is_complete()) {
            return Ok(StorageSelection::InfluxDb(influx.clone()));
        }

        if let Some(fs) = self
            .filesystem
            .as_ref()
            .filter(|c| !c.base_path.trim().is_empty())
        {
            return Ok(StorageSelection::Filesystem(fs.clone()));
        }

        bail!(
            "Storage backend not configured. Provide either InfluxDB configuration \
             (INFLUX_URL, INFLUX_TOKEN, INFLUX_ORG, INFLUX_BUCKET) or a local file \
             storage path (DATA_PATH)"
        )
    }

    pub fn influxdb_mut(&mut self) -> &mut InfluxDbConfig {
        self.influxdb.get_or_insert_with(InfluxDbConfig::default)
    }

    pub fn filesystem_mut(&mut self) -> &mut FilesystemConfig {
        self.filesystem.get_or_insert_with(FilesystemConfig::default)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InfluxDbConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub org: String,

    #[serde(default)]
    pub bucket: String,

    /// Bucket for `application_errors` points; defaults to `bucket`
    #[serde(default)]
    pub error_bucket: Option<String>,

    #[serde(default = "default_influx_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_retries")]
    pub max_retries: u32,

    /// Measurement keys never written as fields
    #[serde(default = "default_excluded_fields")]
    pub excluded_fields: Vec<String>,
}

impl Default for InfluxDbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            org: String::new(),
            bucket: String::new(),
            error_bucket: None,
            timeout_seconds: default_influx_timeout(),
            max_retries: default_retries(),
            excluded_fields: default_excluded_fields(),
        }
    }
}

impl InfluxDbConfig {
    /// All four required settings are present
    pub fn is_complete(&self) -> bool {
        [&self.url, &self.token, &self.org, &self.bucket]
            .iter()
            .all(|v| !v.trim().is_empty())
    }

    pub fn error_bucket(&self) -> &str {
        self.error_bucket
            .as_deref()
            .filter(|b| !b.is_empty())
            .unwrap_or(&self.bucket)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FilesystemConfig {
    #[serde(default)]
    pub base_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_interval_ms() -> u64 { 5000 }
fn default_request_timeout() -> u64 { 5 }
fn default_influx_timeout() -> u64 { 10 }
fn default_retries() -> u32 { 2 }
fn default_excluded_fields() -> Vec<String> { vec!["wifi_ssid".to_string()] }
fn default_log_level() -> String { "info".to_string() }
