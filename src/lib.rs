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

// HomeWizard Recorder
//
// A long-running collector for HomeWizard energy devices that:
// - Polls every configured device on its own fixed-interval task
// - Resolves device metadata once and caches it per device
// - Stores each poll in either local JSON files or InfluxDB,
//   selected once at startup
// - Keeps polling through device, network and storage failures

pub mod cache;
pub mod config;
pub mod device;
pub mod error;
pub mod poller;
pub mod storage;

// Re-export main types
pub use cache::MetadataCache;
pub use config::{load_config, load_config_with_env, RecorderConfig, StorageSelection};
pub use device::{DeviceClient, DeviceMetadata, FieldValue, Measurement};
pub use error::RecorderError;
pub use poller::{install_panic_hook, poll_cycle, PollOutcome, Poller};
pub use storage::{BackendFactory, FilesystemBackend, InfluxDbBackend, StorageBackend};
