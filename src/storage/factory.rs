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

// Backend factory for creating storage backends from configuration

use super::backend::StorageBackend;
use super::filesystem::FilesystemBackend;
use super::influxdb::InfluxDbBackend;
use crate::config::{StorageConfig, StorageSelection};
use anyhow::Result;
use std::sync::Arc;

pub struct BackendFactory;

impl BackendFactory {
    /// Create the storage backend for a selection
    pub fn create(selection: &StorageSelection) -> Result<Arc<dyn StorageBackend>> {
        match selection {
            StorageSelection::InfluxDb(config) => {
                let backend = InfluxDbBackend::new(config.clone())?;
                Ok(Arc::new(backend))
            }

            StorageSelection::Filesystem(config) => {
                let backend = FilesystemBackend::new(config.clone())?;
                Ok(Arc::new(backend))
            }
        }
    }

    /// Select and create the backend from storage configuration
    pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
        Self::create(&config.selection()?)
    }
}
