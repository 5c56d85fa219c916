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

// Per-device polling orchestration
//
// Every configured device gets its own task:
//   bootstrap (resolve metadata) -> immediate poll -> poll on every tick
// Each cycle is spawned on its own, so a slow device still starts a new
// cycle on every tick and a panicking cycle cannot take the loop down.
// A failed cycle is logged to the storage backend's error channel. Tasks
// only stop on an explicit shutdown.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::MetadataCache;
use crate::storage::StorageBackend;

tokio::task_local! {
    // Set while a device task runs work whose panics it reports itself
    static CONTAINED: ();
}

/// Result of a single poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Measurements fetched and handed to the storage backend
    Written,
    /// The device could not be reached; the error has been logged
    Unreachable,
}

/// Owns one independent polling task per device
pub struct Poller {
    devices: Vec<String>,
    interval: Duration,
    cache: Arc<MetadataCache>,
    storage: Arc<dyn StorageBackend>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Poller {
    pub fn new(
        devices: Vec<String>,
        interval: Duration,
        cache: Arc<MetadataCache>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            devices,
            interval,
            cache,
            storage,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Number of device tasks still running
    pub async fn running_tasks(&self) -> usize {
        self.tasks
            .lock()
            .await
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Spawn one polling task per device. Calling it again is a no-op.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            warn!("Poller already started");
            return;
        }

        for device in &self.devices {
            let task = DeviceTask {
                device: device.clone(),
                interval: self.interval,
                cache: self.cache.clone(),
                storage: self.storage.clone(),
            };
            let shutdown_rx = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(task.run(shutdown_rx)));
        }

        info!("Started polling {} device(s)", tasks.len());
    }

    /// Run a single poll cycle for `device` outside the schedule
    pub async fn poll_device(&self, device: &str) -> PollOutcome {
        poll_cycle(&self.cache, self.storage.as_ref(), device).await
    }

    /// Stop every device task and wait for in-flight cycles to finish
    ///
    /// Without this the process runs until it is killed, which is also a
    /// supported way to stop it: nothing is buffered in memory.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!("Device task ended abnormally: {}", e);
            }
        }

        info!("Poller stopped");
    }
}

/// State owned by one device's polling loop
struct DeviceTask {
    device: String,
    interval: Duration,
    cache: Arc<MetadataCache>,
    storage: Arc<dyn StorageBackend>,
}

impl DeviceTask {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        // Best effort: failure only means the first cycle tries again
        let cache = self.cache.clone();
        let device = self.device.clone();
        let bootstrap = tokio::spawn(CONTAINED.scope((), async move {
            cache.resolve(&device).await;
        }));
        if let Err(e) = bootstrap.await {
            self.report_failure("resolving", e).await;
        }

        let mut in_flight = JoinSet::new();
        self.spawn_cycle(&mut in_flight);

        // Every tick starts a cycle, even while an earlier one is still waiting
        // on a slow device
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.spawn_cycle(&mut in_flight),
                Some(result) = in_flight.join_next() => self.settle(result).await,
                _ = shutdown_rx.changed() => {
                    debug!("Stopping poll loop for {}", self.device);
                    break;
                }
            }
        }

        while let Some(result) = in_flight.join_next().await {
            self.settle(result).await;
        }
    }

    fn spawn_cycle(&self, in_flight: &mut JoinSet<PollOutcome>) {
        let cache = self.cache.clone();
        let storage = self.storage.clone();
        let device = self.device.clone();

        in_flight.spawn(CONTAINED.scope((), async move {
            poll_cycle(&cache, storage.as_ref(), &device).await
        }));
    }

    async fn settle(&self, result: Result<PollOutcome, JoinError>) {
        match result {
            Ok(outcome) => debug!("Poll cycle for {} finished: {:?}", self.device, outcome),
            Err(e) => self.report_failure("polling", e).await,
        }
    }

    async fn report_failure(&self, stage: &str, e: JoinError) {
        if !e.is_panic() {
            warn!("Work for {} was cancelled while {}: {}", self.device, stage, e);
            return;
        }

        let message = panic_message(e.into_panic());
        error!("Unhandled panic while {} {}: {}", stage, self.device, message);
        self.storage
            .log_error(
                &format!("Unhandled panic while {} {}", stage, self.device),
                &anyhow::anyhow!(message),
            )
            .await;
    }
}

/// Forward panics to the storage backend's error channel
///
/// Panics inside device tasks are reported by the poller with the device as
/// context and are skipped here. Anything else is logged as "Uncaught panic"
/// on a best-effort basis: only when a tokio runtime is still around to run
/// the write. The previously installed hook runs afterwards.
pub fn install_panic_hook(storage: Arc<dyn StorageBackend>) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if CONTAINED.try_with(|_| ()).is_err() {
            error!("Uncaught panic: {}", info);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let storage = storage.clone();
                let message = info.to_string();
                handle.spawn(async move {
                    storage
                        .log_error("Uncaught panic", &anyhow::anyhow!(message))
                        .await;
                });
            }
        }
        default_hook(info);
    }));
}

/// One poll: resolve metadata, fetch measurements, hand them to storage
///
/// Errors never escape: they are logged through the backend's error channel
/// with the device as context.
pub async fn poll_cycle(
    cache: &MetadataCache,
    storage: &dyn StorageBackend,
    device: &str,
) -> PollOutcome {
    // Metadata resolution falls back to a placeholder, so it never fails the cycle
    let metadata = cache.resolve(device).await;

    let measurement = match cache.client().fetch_measurements(device).await {
        Ok(measurement) => measurement,
        Err(e) => {
            error!("Failed to poll {}: {}", device, e);
            storage
                .log_error(&format!("Polling {}", device), &anyhow::Error::new(e))
                .await;
            return PollOutcome::Unreachable;
        }
    };

    storage
        .write_measurement(device, &measurement, &metadata)
        .await;
    info!("Data pushed for {}", device);

    PollOutcome::Written
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
