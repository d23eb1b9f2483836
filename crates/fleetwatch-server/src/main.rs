//! Fleetwatch monitor binary.
//!
//! Wires the HTTP stores, the stream hub, and the `WebSocket` gateway
//! together and runs until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `fleetwatch-config.yaml` (or defaults)
//! 2. Initialize structured logging (tracing)
//! 3. Build the Probe and Alert Store clients
//! 4. Create the stream hub and spawn its tick loop
//! 5. Serve the gateway until `Ctrl-C`
//! 6. Stop the tick loop and wait for the last tick to settle

mod error;

use std::path::Path;
use std::sync::Arc;

use fleetwatch_stream::{
    AppOriginPolicy, AppState, ConnectionGateway, HttpAlertStore, HttpProbeStore, MonitorConfig,
    ServerConfig, StreamHub, start_server,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::MonitorError;

const CONFIG_PATH: &str = "fleetwatch-config.yaml";

#[tokio::main]
async fn main() -> Result<(), MonitorError> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        from_file,
        probe_url = config.stores.probe_url,
        alert_url = config.stores.alert_url,
        tick_interval_ms = config.stream.tick_interval_ms,
        "fleetwatch-server starting"
    );
    if config.server.app_origin.is_none() {
        warn!("no app_origin configured, accepting connections from any origin");
    }

    // 3. Store clients.
    let probes = Arc::new(HttpProbeStore::new(config.stores.probe_url.clone()));
    let alerts = Arc::new(HttpAlertStore::new(config.stores.alert_url.clone()));

    // 4. Hub and tick loop.
    let hub = Arc::new(StreamHub::new(config.stream.hub_config(), probes, alerts));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tick_loop = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move { hub.run(shutdown_rx).await })
    };

    // 5. Gateway.
    let policy = AppOriginPolicy::new(config.server.app_origin.clone());
    let gateway = ConnectionGateway::new(config.server.route_path.clone(), Arc::new(policy));
    let state = Arc::new(AppState::new(hub, Arc::new(gateway)));
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    info!(route = config.server.route_path, "gateway configured");

    let served = start_server(&server_config, state, shutdown_signal()).await;
    if let Err(e) = &served {
        error!(error = %e, "gateway stopped");
    }

    // 6. Stop ticking.
    // A closed receiver means the loop already exited.
    let _ = shutdown_tx.send(true);
    tick_loop.await.map_err(|e| MonitorError::TickLoop {
        message: e.to_string(),
    })?;

    served?;
    info!("fleetwatch-server shutdown complete");
    Ok(())
}

/// Load `fleetwatch-config.yaml` from the working directory, falling back
/// to defaults (with environment overrides) when it does not exist.
fn load_config() -> Result<(MonitorConfig, bool), MonitorError> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() {
        return Ok((MonitorConfig::from_file(path)?, true));
    }
    let mut config = MonitorConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok((config, false))
}

/// Resolves on `Ctrl-C`. If the handler cannot be installed the server
/// keeps running until killed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
