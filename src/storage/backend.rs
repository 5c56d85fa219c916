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

// Storage backend trait for measurement recording

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::device::{DeviceMetadata, Measurement};

/// The unit a backend durably stores. Timestamped at write time.
#[derive(Debug, Clone, Copy)]
pub struct PersistedEntry<'a> {
    pub timestamp: DateTime<Utc>,
    pub device: &'a str,
    pub metadata: &'a DeviceMetadata,
    pub measurement: &'a Measurement,
}

impl<'a> PersistedEntry<'a> {
    pub fn now(device: &'a str, measurement: &'a Measurement, metadata: &'a DeviceMetadata) -> Self {
        Self {
            timestamp: Utc::now(),
            device,
            metadata,
            measurement,
        }
    }

    /// RFC 3339 timestamp with millisecond precision, e.g. `2025-01-01T12:00:00.000Z`
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Storage backend for polled measurements
///
/// One backend is selected at startup and shared by every device task, so
/// implementations must tolerate concurrent calls.
///
/// `write_measurement` and `log_error` never return errors: a lost write must
/// not halt polling, so failures are logged by the backend and swallowed.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Prepare the backend (create directories, etc). Failures are logged.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Best-effort reachability/writability probe, used for the startup diagnostic
    async fn check_connection(&self) -> bool;

    /// Persist one measurement with its device metadata
    ///
    /// # Arguments
    /// * `device` - Device identity (IP address or hostname)
    /// * `measurement` - Fields returned by the device
    /// * `metadata` - Cached (or placeholder) device metadata
    async fn write_measurement(
        &self,
        device: &str,
        measurement: &Measurement,
        metadata: &DeviceMetadata,
    );

    /// Record an operational error on the backend's error channel
    ///
    /// # Arguments
    /// * `context` - Where the error happened, e.g. "Polling 10.0.0.5"
    /// * `error` - The error; its cause chain is recorded as the stack detail
    async fn log_error(&self, context: &str, error: &anyhow::Error);

    /// Flush and release resources before the process exits
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    /// Get backend type identifier
    fn backend_type(&self) -> &str;
}

/// Run `op` until it succeeds or `max_retries` retries are used up,
/// doubling the delay between attempts (capped at 30 seconds).
pub async fn with_retry<T, F, Fut>(label: &str, max_retries: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = Duration::from_millis(100);

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    info!("{} succeeded after {} retries", label, attempt);
                }
                return Ok(value);
            }
            Err(e) if attempt < max_retries => {
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    label,
                    attempt + 1,
                    max_retries,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2; // Exponential backoff
                delay = delay.min(Duration::from_secs(30));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
