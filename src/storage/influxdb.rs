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

// InfluxDB v2 backend implementation

use super::backend::{with_retry, PersistedEntry, StorageBackend};
use super::line_protocol::Point;
use crate::config::InfluxDbConfig;
use crate::device::{DeviceMetadata, Measurement};
use crate::error::{error_chain, RecorderError};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Measurement name used for error points
pub const ERROR_MEASUREMENT: &str = "application_errors";

const FALLBACK_MEASUREMENT: &str = "homewizard_device";

/// HTTP writer for the InfluxDB v2 API
struct InfluxWriter {
    client: Client,
    url: String,
    token: String,
    org: String,
    bucket: String,
    error_bucket: String,
    max_retries: u32,
}

impl InfluxWriter {
    fn new(config: &InfluxDbConfig) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            error_bucket: config.error_bucket().to_string(),
            max_retries: config.max_retries,
        })
    }

    async fn write_lines(&self, bucket: &str, body: String) -> Result<()> {
        let url = format!("{}/api/v2/write", self.url);

        let response = self
            .client
            .post(&url)
            .query(&[("org", self.org.as_str()), ("bucket", bucket), ("precision", "ns")])
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.token))
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            bail!(
                "InfluxDB write failed with status {}: {}",
                status,
                error_text
            );
        }

        Ok(())
    }

    async fn write_point(&self, bucket: &str, point: &Point) -> Result<()> {
        let line = point.to_line_protocol();
        with_retry("InfluxDB write", self.max_retries, || {
            self.write_lines(bucket, line.clone())
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/ping", self.url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach InfluxDB")?;

        if !response.status().is_success() {
            bail!("ping returned status {}", response.status());
        }
        Ok(())
    }
}

/// InfluxDB backend writing one point per poll
///
/// Without a URL the backend is inert: every operation is a no-op and the
/// connection check reports false.
pub struct InfluxDbBackend {
    writer: Option<InfluxWriter>,
    url: String,
    excluded_fields: Vec<String>,
}

impl InfluxDbBackend {
    pub fn new(config: InfluxDbConfig) -> Result<Self> {
        let writer = if config.url.trim().is_empty() {
            None
        } else {
            Some(InfluxWriter::new(&config)?)
        };

        Ok(Self {
            writer,
            url: config.url,
            excluded_fields: config.excluded_fields,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.writer.is_some()
    }

    /// Build the point for a persisted entry
    ///
    /// The product type names the series; device, product name and product
    /// type are tags; every scalar measurement value becomes a typed field.
    pub fn measurement_point(&self, entry: &PersistedEntry<'_>) -> Point {
        let metadata = entry.metadata;
        let measurement_name = non_empty_or(&metadata.product_type, FALLBACK_MEASUREMENT);

        let mut point = Point::new(measurement_name)
            .tag("device", entry.device)
            .tag("product_name", non_empty_or(&metadata.product_name, "unknown"))
            .tag("product_type", non_empty_or(&metadata.product_type, "unknown"));

        for (key, value) in entry.measurement.fields() {
            if self.excluded_fields.iter().any(|excluded| excluded == key) {
                continue;
            }
            point = point.field(key, value);
        }

        point.timestamp(entry.timestamp)
    }

    fn report_write_failure(&self, error: &anyhow::Error) {
        let err = RecorderError::StorageWriteFailed {
            backend: self.backend_type().to_string(),
            reason: format!("{:#}", error),
        };
        error!("{}", err);

        if is_connectivity_error(error) {
            error!(
                "CRITICAL: Unable to connect to InfluxDB at {}. Is it running?",
                self.url
            );
        }
    }
}

#[async_trait]
impl StorageBackend for InfluxDbBackend {
    async fn check_connection(&self) -> bool {
        let Some(writer) = &self.writer else {
            return false;
        };

        match writer.ping().await {
            Ok(()) => {
                info!("Successfully connected to InfluxDB");
                true
            }
            Err(e) => {
                let err = RecorderError::StorageUnavailable {
                    backend: self.backend_type().to_string(),
                    reason: format!("{:#}", e),
                };
                warn!("FAILED to connect to InfluxDB at {}: {}", self.url, err);
                warn!("Please check if InfluxDB is running and the URL is correct.");
                false
            }
        }
    }

    async fn write_measurement(
        &self,
        device: &str,
        measurement: &Measurement,
        metadata: &DeviceMetadata,
    ) {
        let Some(writer) = &self.writer else {
            return;
        };

        let entry = PersistedEntry::now(device, measurement, metadata);
        let point = self.measurement_point(&entry);
        if !point.has_fields() {
            debug!("No scalar fields in measurement from {}, skipping write", device);
            return;
        }

        if let Err(e) = writer.write_point(&writer.bucket, &point).await {
            self.report_write_failure(&e);
        }
    }

    async fn log_error(&self, context: &str, error: &anyhow::Error) {
        let Some(writer) = &self.writer else {
            debug!("(No InfluxDB) Error in {}: {:#}", context, error);
            return;
        };

        let point = Point::new(ERROR_MEASUREMENT)
            .tag("context", context)
            .string_field("message", error.to_string())
            .string_field("stack", error_chain(error))
            .timestamp(Utc::now());

        if let Err(e) = writer.write_point(&writer.error_bucket, &point).await {
            self.report_write_failure(&e);
        }
    }

    fn backend_type(&self) -> &str {
        "influxdb"
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

fn is_connectivity_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .is_some_and(|e| e.is_connect() || e.is_timeout())
    })
}
