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

// Error taxonomy for the recorder

use thiserror::Error;

/// Errors raised while polling devices and persisting their data.
///
/// None of these are fatal to a device's polling loop: they are caught at the
/// poll cycle boundary, logged, and the loop continues on its next tick.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Network failure, timeout or non-success response talking to a device
    #[error("device {device} unreachable: {source}")]
    DeviceUnreachable {
        device: String,
        #[source]
        source: reqwest::Error,
    },

    /// The device answered, but the body is not the JSON we expect
    #[error("device {device} returned an invalid response: {source}")]
    InvalidResponse {
        device: String,
        #[source]
        source: reqwest::Error,
    },

    /// Metadata fetch failed; callers fall back to placeholder metadata
    #[error("metadata for {device} unresolved: {reason}")]
    MetadataUnresolved { device: String, reason: String },

    #[error("{backend} write failed: {reason}")]
    StorageWriteFailed { backend: String, reason: String },

    #[error("{backend} unavailable: {reason}")]
    StorageUnavailable { backend: String, reason: String },
}

impl RecorderError {
    /// Device identity this error relates to, if any
    pub fn device(&self) -> Option<&str> {
        match self {
            RecorderError::DeviceUnreachable { device, .. }
            | RecorderError::InvalidResponse { device, .. }
            | RecorderError::MetadataUnresolved { device, .. } => Some(device),
            _ => None,
        }
    }
}

/// Render an error and its cause chain, one cause per line.
///
/// Used as the "stack" detail when errors are recorded in a storage
/// backend's error channel.
pub fn error_chain(error: &anyhow::Error) -> String {
    error
        .chain()
        .enumerate()
        .map(|(i, cause)| {
            if i == 0 {
                cause.to_string()
            } else {
                format!("caused by: {}", cause)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
