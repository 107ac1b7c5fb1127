//! Runs the simulator together with its web monitor.
//!
//! The simulation timers run on their own threads inside the host. A
//! publisher thread samples the host's diagnostics into a bounded channel,
//! and the web monitor serves them from the `tokio` runtime.
//!
//! Usage: `plcsim [TOPOLOGY.xml]`
//!
//! * `PLCSIM_MONITOR_ADDR`: monitor address, `127.0.0.1:3000` by default.
//! * `PLCSIM_SEED`: seed for reproducible value and alarm sequences.

use log::{error, info, warn};
use plcsim_rs::{ServerHost, SimulationConfig};
use plcsim_rs_monitor::{SnapshotPublisher, start_in_process_monitor};
use plcsim_rs_topology::load_topology_from_file;
use std::{env, net::SocketAddr, process, sync::Arc, time::Duration};

const DEFAULT_MONITOR_ADDR: &str = "127.0.0.1:3000";
const SNAPSHOT_PERIOD: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match build_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };
    let monitor_addr: SocketAddr = match env::var("PLCSIM_MONITOR_ADDR")
        .unwrap_or_else(|_| DEFAULT_MONITOR_ADDR.to_string())
        .parse()
    {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid PLCSIM_MONITOR_ADDR: {}", e);
            process::exit(1);
        }
    };

    // 1. Build the host and start the timers.
    let host = match ServerHost::with_config(&config) {
        Ok(host) => Arc::new(host),
        Err(e) => {
            error!("Failed to register node managers: {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = host.start() {
        error!("Failed to create the address space: {}", e);
        process::exit(1);
    }
    info!(
        "Simulation started with {} managers",
        host.managers().count()
    );

    // 2. Capacity 1: the publisher drops a snapshot rather than wait
    // for a slow monitor.
    let (snapshot_tx, snapshot_rx) = crossbeam_channel::bounded(1);
    let mut publisher = match SnapshotPublisher::spawn(Arc::clone(&host), SNAPSHOT_PERIOD, snapshot_tx)
    {
        Ok(publisher) => publisher,
        Err(e) => {
            error!("Failed to start the snapshot publisher: {}", e);
            host.shutdown();
            process::exit(1);
        }
    };

    // 3. Serve the monitor until Ctrl-C or until the listener fails.
    tokio::select! {
        result = start_in_process_monitor(snapshot_rx, monitor_addr) => {
            if let Err(e) = result {
                error!("Web monitor failed: {}", e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Ctrl-C received, shutting down"),
                Err(e) => warn!("Cannot listen for Ctrl-C ({}), shutting down", e),
            }
        }
    }

    publisher.stop();
    host.shutdown();
    info!("Simulation stopped");
}

/// Default configuration, overridden by the optional topology file and
/// the `PLCSIM_SEED` variable.
fn build_config() -> Result<SimulationConfig, String> {
    let mut config = SimulationConfig::default();

    if let Some(path) = env::args().nth(1) {
        let topology = load_topology_from_file(&path).map_err(|e| format!("{}: {}", path, e))?;
        info!(
            "Loaded topology from {} ({} areas)",
            path,
            topology.area_count()
        );
        topology.apply_to(&mut config);
    }

    if let Ok(seed) = env::var("PLCSIM_SEED") {
        let seed = seed
            .parse::<u64>()
            .map_err(|e| format!("PLCSIM_SEED: {}", e))?;
        config.seed = Some(seed);
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}
