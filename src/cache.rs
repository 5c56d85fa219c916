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

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::device::{DeviceClient, DeviceMetadata};
use crate::error::RecorderError;

/// Per-device memoization of the metadata lookup
///
/// Only successful lookups are stored. A failed lookup yields
/// [`DeviceMetadata::unknown`] and leaves the slot empty, so the next
/// resolve for that device goes back to the network.
pub struct MetadataCache {
    client: Arc<DeviceClient>,
    entries: DashMap<String, DeviceMetadata>,
}

impl MetadataCache {
    pub fn new(client: Arc<DeviceClient>) -> Self {
        Self {
            client,
            entries: DashMap::new(),
        }
    }

    pub fn client(&self) -> &Arc<DeviceClient> {
        &self.client
    }

    /// Return cached metadata for `device`, fetching it on a miss
    pub async fn resolve(&self, device: &str) -> DeviceMetadata {
        if let Some(cached) = self.entries.get(device) {
            return cached.value().clone();
        }

        match self.client.fetch_metadata(device).await {
            Ok(metadata) => {
                info!(
                    "Discovered device at {}: {} ({})",
                    device, metadata.product_name, metadata.product_type
                );
                self.entries.insert(device.to_string(), metadata.clone());
                metadata
            }
            Err(e) => {
                let err = RecorderError::MetadataUnresolved {
                    device: device.to_string(),
                    reason: e.to_string(),
                };
                warn!("{}", err);
                DeviceMetadata::unknown()
            }
        }
    }

    /// Cached metadata without touching the network
    pub fn get(&self, device: &str) -> Option<DeviceMetadata> {
        self.entries.get(device).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
