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

// HTTP client for HomeWizard devices (local API v1)

use crate::error::RecorderError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

/// Device metadata as reported by `GET /api/`
///
/// Only the two fields used for naming are typed. Everything else
/// (`serial`, `firmware_version`, `api_version`, ...) is kept verbatim in
/// `extra`, whatever JSON type the device uses for it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DeviceMetadata {
    #[serde(default, deserialize_with = "lenient_string")]
    pub product_name: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub product_type: String,

    /// Any additional fields the device reports
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceMetadata {
    pub fn new(product_name: impl Into<String>, product_type: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            product_type: product_type.into(),
            ..Default::default()
        }
    }

    /// Placeholder used when metadata could not be fetched. Never cached.
    pub fn unknown() -> Self {
        Self::new("Unknown", "unknown")
    }

    pub fn is_unknown(&self) -> bool {
        self.product_name == "Unknown" && self.product_type == "unknown"
    }

    /// Additional field reported by the device, e.g. `firmware_version`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// Read a scalar as text; `null` becomes empty
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// A single measurement value, classified by type
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl FieldValue {
    /// Classify a JSON value. Nulls, arrays and objects are not scalar fields.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(FieldValue::Float),
            Value::Bool(b) => Some(FieldValue::Boolean(*b)),
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            _ => None,
        }
    }
}

/// One poll's worth of data from `GET /api/v1/data`
///
/// The field set is open-ended and depends on the device type, so the raw
/// JSON object is kept as-is and typed on demand.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Measurement(Map<String, Value>);

impl Measurement {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scalar fields with their classified type, in device order
    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldValue)> {
        self.0
            .iter()
            .filter_map(|(k, v)| FieldValue::from_json(v).map(|f| (k.as_str(), f)))
    }
}

impl From<Map<String, Value>> for Measurement {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Stateless, single-attempt accessor for device HTTP endpoints
///
/// One client is shared by every device task; retries are the caller's
/// business (the poller simply tries again on its next tick).
#[derive(Debug, Clone)]
pub struct DeviceClient {
    client: Client,
}

impl DeviceClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build device HTTP client: {}", e))?;

        Ok(Self { client })
    }

    /// Fetch device metadata (`GET /api/`)
    pub async fn fetch_metadata(&self, device: &str) -> Result<DeviceMetadata, RecorderError> {
        self.get_json(device, "/api/").await
    }

    /// Fetch current measurements (`GET /api/v1/data`)
    pub async fn fetch_measurements(&self, device: &str) -> Result<Measurement, RecorderError> {
        self.get_json(device, "/api/v1/data").await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        device: &str,
        path: &str,
    ) -> Result<T, RecorderError> {
        let url = device_url(device, path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| RecorderError::DeviceUnreachable {
                device: device.to_string(),
                source,
            })?;

        response
            .json::<T>()
            .await
            .map_err(|source| RecorderError::InvalidResponse {
                device: device.to_string(),
                source,
            })
    }
}

/// Build the URL for a device endpoint. Identities are bare hosts
/// (IP or hostname, optionally with a port).
pub fn device_url(device: &str, path: &str) -> String {
    format!("http://{}{}", device.trim_end_matches('/'), path)
}
