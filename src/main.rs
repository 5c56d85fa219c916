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

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use homewizard_recorder::config::load_config_with_env;
use homewizard_recorder::{
    install_panic_hook, BackendFactory, DeviceClient, MetadataCache, Poller, RecorderConfig,
    StorageBackend,
};

/// HomeWizard Recorder - Poll HomeWizard devices into files or InfluxDB
///
/// Settings come from the optional config file and the environment
/// (DEVICES, POLL_INTERVAL, DATA_PATH, INFLUX_URL, INFLUX_TOKEN,
/// INFLUX_ORG, INFLUX_BUCKET, INFLUX_ERROR_BUCKET, LOG_LEVEL).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Refuses to start without devices or a usable storage backend
    let config = load_config_with_env(args.config.as_ref())?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting HomeWizard Recorder");
    if let Some(path) = &args.config {
        info!("Loaded configuration from: {:?}", path);
    }
    info!("Polling interval: {}ms", config.polling.interval_ms);
    info!("Devices to poll: {}", config.devices.join(", "));

    let selection = config.storage.selection()?;
    info!("Using storage provider: {}", selection.name());
    let storage = BackendFactory::create(&selection)?;
    install_panic_hook(storage.clone());

    if let Err(e) = storage.initialize().await {
        warn!("Storage initialization failed: {:#}", e);
    }

    // Startup probe is diagnostic only; polling starts either way
    if storage.check_connection().await {
        info!("Startup Check Passed: {} is ready.", selection.name());
    } else {
        error!(
            "Startup Check Failed: {} is not reachable/writable.",
            selection.name()
        );
    }

    let result = run(&config, storage.clone()).await;
    if let Err(e) = &result {
        error!("Uncaught error: {:#}", e);
        storage.log_error("Uncaught error", e).await;
    }

    if let Err(e) = storage.shutdown().await {
        warn!("Storage shutdown failed: {:#}", e);
    }

    result
}

async fn run(config: &RecorderConfig, storage: Arc<dyn StorageBackend>) -> Result<()> {
    let client = Arc::new(DeviceClient::new(config.polling.request_timeout())?);
    let cache = Arc::new(MetadataCache::new(client));

    let poller = Poller::new(
        config.devices.clone(),
        config.polling.interval(),
        cache,
        storage,
    );
    poller.start().await;

    wait_for_shutdown_signal().await?;

    info!("Shutting down");
    poller.shutdown().await;
    info!("HomeWizard Recorder shut down successfully");

    Ok(())
}

/// Wait for Ctrl+C, or SIGTERM on unix (container stop)
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
