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

// Filesystem backend implementation

use super::backend::{PersistedEntry, StorageBackend};
use crate::config::FilesystemConfig;
use crate::device::{DeviceMetadata, Measurement};
use crate::error::RecorderError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Name of the shared error log under the base directory
pub const ERROR_LOG_FILE: &str = "errors.log";

const UNKNOWN_DEVICE_DIR: &str = "unknown_device";

/// On-disk JSON layout of one persisted entry
#[derive(Serialize)]
struct FileRecord<'a> {
    timestamp: String,
    device_ip: &'a str,
    device_info: &'a DeviceMetadata,
    measurements: &'a Measurement,
}

/// Filesystem backend writing one JSON file per poll
///
/// Layout:
/// ```text
/// {base_path}/
///   errors.log
///   {product_type}/
///     2025-01-01T12-00-00.000Z_10.0.0.5.json
/// ```
pub struct FilesystemBackend {
    base_path: PathBuf,
    error_log_lock: Mutex<()>,
}

impl FilesystemBackend {
    pub fn new(config: FilesystemConfig) -> Result<Self> {
        let base_path = PathBuf::from(&config.base_path);

        info!(
            "Initializing filesystem backend at: {}",
            base_path.display()
        );

        Ok(Self {
            base_path,
            error_log_lock: Mutex::new(()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.base_path.join(ERROR_LOG_FILE)
    }

    /// Ensure base directory exists
    async fn ensure_base_directory(&self) -> Result<()> {
        if !self.base_path.exists() {
            info!("Creating base directory: {}", self.base_path.display());
            fs::create_dir_all(&self.base_path)
                .await
                .with_context(|| {
                    format!("Failed to create base directory {}", self.base_path.display())
                })?;
        }
        Ok(())
    }

    /// Directory holding entries for a device category
    fn category_dir(&self, metadata: &DeviceMetadata) -> PathBuf {
        let product_type = if metadata.product_type.is_empty() {
            UNKNOWN_DEVICE_DIR
        } else {
            metadata.product_type.as_str()
        };
        self.base_path.join(sanitize_path_segment(product_type))
    }

    /// Write one entry and return the path of the created file
    ///
    /// Files are created exclusively. If the timestamped name is already
    /// taken a numeric suffix is appended, so an entry never replaces another.
    pub async fn persist(&self, entry: &PersistedEntry<'_>) -> Result<PathBuf> {
        let entry_dir = self.category_dir(entry.metadata);
        if !entry_dir.exists() {
            debug!("Creating entry directory: {}", entry_dir.display());
            fs::create_dir_all(&entry_dir).await.with_context(|| {
                format!("Failed to create directory {}", entry_dir.display())
            })?;
        }

        let timestamp = entry.timestamp_rfc3339();
        let record = FileRecord {
            timestamp: timestamp.clone(),
            device_ip: entry.device,
            device_info: entry.metadata,
            measurements: entry.measurement,
        };
        let json = serde_json::to_string_pretty(&record).context("Failed to serialize entry")?;

        let stem = format!(
            "{}_{}",
            timestamp.replace(':', "-"),
            sanitize_file_stem(entry.device)
        );

        let mut attempt = 0u32;
        let (file_path, mut file) = loop {
            let filename = if attempt == 0 {
                format!("{}.json", stem)
            } else {
                format!("{}_{}.json", stem, attempt)
            };
            let file_path = entry_dir.join(filename);

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&file_path)
                .await
            {
                Ok(file) => break (file_path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to create file: {}", file_path.display())
                    })
                }
            }
        };

        file.write_all(json.as_bytes())
            .await
            .with_context(|| format!("Failed to write file: {}", file_path.display()))?;
        file.flush().await.context("Failed to flush data")?;

        debug!("Wrote {} bytes to {}", json.len(), file_path.display());

        Ok(file_path)
    }

    async fn append_error_line(&self, line: &str) -> Result<()> {
        let log_file = self.error_log_path();
        let _guard = self.error_log_lock.lock().await;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .await
            .with_context(|| format!("Failed to open error log {}", log_file.display()))?;

        file.write_all(line.as_bytes())
            .await
            .context("Failed to append to error log")?;
        file.flush().await.context("Failed to flush error log")?;

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn initialize(&self) -> Result<()> {
        self.ensure_base_directory().await
    }

    async fn check_connection(&self) -> bool {
        // Check if base directory is accessible and writable
        match fs::metadata(&self.base_path).await {
            Ok(metadata) if metadata.is_dir() => {
                let test_file = self.base_path.join(".write_check");
                match fs::File::create(&test_file).await {
                    Ok(mut f) => {
                        if let Err(e) = f.write_all(b"test").await {
                            warn!(
                                "FAILED to write to local data path {}: {}",
                                self.base_path.display(),
                                e
                            );
                            return false;
                        }
                        let _ = fs::remove_file(&test_file).await;
                        info!("Local storage is writable at {}", self.base_path.display());
                        true
                    }
                    Err(e) => {
                        warn!(
                            "FAILED to write to local data path {}: {}",
                            self.base_path.display(),
                            e
                        );
                        false
                    }
                }
            }
            Ok(_) => {
                warn!(
                    "Data path is not a directory: {}",
                    self.base_path.display()
                );
                false
            }
            Err(e) => {
                warn!(
                    "Cannot access local data path {}: {}",
                    self.base_path.display(),
                    e
                );
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
        let entry = PersistedEntry::now(device, measurement, metadata);
        if let Err(e) = self.persist(&entry).await {
            let err = RecorderError::StorageWriteFailed {
                backend: self.backend_type().to_string(),
                reason: format!("{:#}", e),
            };
            error!("{}", err);
        }
    }

    async fn log_error(&self, context: &str, error: &anyhow::Error) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let message = format!("{:#}", error).replace('\n', " ");
        let line = format!("{} [{}] {}\n", timestamp, context, message);

        // No secondary channel here: if the log file fails, the process log is all we have
        if let Err(e) = self.append_error_line(&line).await {
            error!("{:#} (while logging '{}': {})", e, context, message);
        }
    }

    fn backend_type(&self) -> &str {
        "filesystem"
    }
}

/// Replace anything outside `[A-Za-z0-9_-]` so the value is a safe directory name
pub fn sanitize_path_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Like [`sanitize_path_segment`] but keeps dots, so IP addresses stay readable
fn sanitize_file_stem(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn create_test_backend() -> (FilesystemBackend, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = FilesystemConfig {
            base_path: temp_dir.path().to_string_lossy().to_string(),
        };
        let backend = FilesystemBackend::new(config).unwrap();
        (backend, temp_dir)
    }

    fn p1_measurement() -> Measurement {
        serde_json::from_value(json!({"power_w": 120.5, "active": true})).unwrap()
    }

    #[test]
    fn test_sanitize_path_segment() {
        assert_eq!(sanitize_path_segment("p1_meter"), "p1_meter");
        assert_eq!(sanitize_path_segment("HWE-P1"), "HWE-P1");
        assert_eq!(sanitize_path_segment("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_path_segment("energy socket"), "energy_socket");
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("10.0.0.5"), "10.0.0.5");
        assert_eq!(sanitize_file_stem("127.0.0.1:8080"), "127.0.0.1_8080");
    }

    #[tokio::test]
    async fn test_initialize_creates_base_directory() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("nested").join("data");
        let backend = FilesystemBackend::new(FilesystemConfig {
            base_path: base.to_string_lossy().to_string(),
        })
        .unwrap();

        backend.initialize().await.unwrap();
        assert!(base.is_dir());
    }

    #[tokio::test]
    async fn test_persist_layout_and_content() {
        let (backend, _temp_dir) = create_test_backend();
        backend.initialize().await.unwrap();

        let metadata = DeviceMetadata::new("P1 Meter", "p1_meter");
        let measurement = p1_measurement();
        let entry = PersistedEntry::now("10.0.0.5", &measurement, &metadata);

        let path = backend.persist(&entry).await.unwrap();
        assert_eq!(path.parent().unwrap(), backend.base_path().join("p1_meter"));

        let filename = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(filename.ends_with("_10.0.0.5.json"));
        assert!(!filename.contains(':'));

        let content: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(content["device_ip"], "10.0.0.5");
        assert_eq!(content["device_info"]["product_name"], "P1 Meter");
        assert_eq!(content["measurements"]["power_w"], 120.5);
        assert_eq!(content["measurements"]["active"], true);
        assert_eq!(content["timestamp"], entry.timestamp_rfc3339());
    }

    #[tokio::test]
    async fn test_same_entry_twice_never_overwrites() {
        let (backend, _temp_dir) = create_test_backend();
        backend.initialize().await.unwrap();

        let metadata = DeviceMetadata::new("P1 Meter", "p1_meter");
        let measurement = p1_measurement();
        let entry = PersistedEntry::now("10.0.0.5", &measurement, &metadata);

        let first = backend.persist(&entry).await.unwrap();
        let second = backend.persist(&entry).await.unwrap();

        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
    }

    #[tokio::test]
    async fn test_missing_product_type_uses_unknown_device_dir() {
        let (backend, _temp_dir) = create_test_backend();
        backend.initialize().await.unwrap();

        let metadata = DeviceMetadata::default();
        backend
            .write_measurement("10.0.0.7", &p1_measurement(), &metadata)
            .await;

        let dir = backend.base_path().join("unknown_device");
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_log_error_appends_lines() {
        let (backend, _temp_dir) = create_test_backend();
        backend.initialize().await.unwrap();

        backend
            .log_error("Polling 10.0.0.9", &anyhow::anyhow!("connection refused"))
            .await;
        backend
            .log_error("Polling 10.0.0.5", &anyhow::anyhow!("timeout"))
            .await;

        let content = std::fs::read_to_string(backend.error_log_path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[Polling 10.0.0.9] connection refused"));
        assert!(lines[1].ends_with("[Polling 10.0.0.5] timeout"));
    }

    #[tokio::test]
    async fn test_check_connection() {
        let (backend, _temp_dir) = create_test_backend();
        backend.initialize().await.unwrap();

        assert!(backend.check_connection().await);
        assert!(!backend.base_path().join(".write_check").exists());
    }

    #[tokio::test]
    async fn test_check_connection_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FilesystemBackend::new(FilesystemConfig {
            base_path: temp_dir.path().join("missing").to_string_lossy().to_string(),
        })
        .unwrap();

        assert!(!backend.check_connection().await);
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let temp_dir = TempDir::new().unwrap();
        // A regular file where the base directory should be
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let backend = FilesystemBackend::new(FilesystemConfig {
            base_path: blocker.to_string_lossy().to_string(),
        })
        .unwrap();

        // Must not panic or propagate
        backend
            .write_measurement(
                "10.0.0.5",
                &p1_measurement(),
                &DeviceMetadata::new("P1 Meter", "p1_meter"),
            )
            .await;
        backend
            .log_error("Polling 10.0.0.5", &anyhow::anyhow!("boom"))
            .await;
    }
}
