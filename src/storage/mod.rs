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

// Storage backend module
//
// Provides a trait-based abstraction over the two storage backends
// (local JSON files, InfluxDB). One backend is selected at startup and
// shared by every device polling task.
//
// This module focuses on WRITE-ONLY operations.
// Users should query backends directly using their specialized tools.

pub mod backend;
pub mod factory;
pub mod filesystem;
pub mod influxdb;
pub mod line_protocol;

pub use backend::{PersistedEntry, StorageBackend};
pub use factory::BackendFactory;
pub use filesystem::{sanitize_path_segment, FilesystemBackend, ERROR_LOG_FILE};
pub use influxdb::{InfluxDbBackend, ERROR_MEASUREMENT};
pub use line_protocol::Point;
