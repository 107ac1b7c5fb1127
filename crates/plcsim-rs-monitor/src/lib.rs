// crates/plcsim-rs-monitor/src/lib.rs

//! A web monitor for a running simulator.
//!
//! The simulation side runs a [`SnapshotPublisher`] that pushes
//! [`DiagnosticSnapshot`]s into a bounded `crossbeam` channel. The monitor
//! side, [`start_in_process_monitor`], bridges that channel into a `tokio`
//! broadcast channel and serves it to WebSocket clients on `/ws`.

pub mod model;
pub mod publisher;
mod server;

pub use model::{DiagnosticSnapshot, GroupInfo, ManagerInfo};
pub use publisher::SnapshotPublisher;

use crossbeam_channel::Receiver;
use log::info;
use std::net::SocketAddr;
use tokio::sync::broadcast;

/// Snapshots buffered per WebSocket client before it starts lagging.
const BROADCAST_CAPACITY: usize = 16;

/// Starts the web monitor and serves until the listener fails.
///
/// * `receiver`: snapshots coming from the simulation threads.
/// * `addr`: where to serve the monitor page and the `/ws` endpoint.
pub async fn start_in_process_monitor(
    receiver: Receiver<DiagnosticSnapshot>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (snapshot_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

    // The crossbeam receiver blocks, so it gets its own thread.
    let bridge_tx = snapshot_tx.clone();
    tokio::task::spawn_blocking(move || {
        while let Ok(snapshot) = receiver.recv() {
            // No subscribers is not an error.
            let _ = bridge_tx.send(snapshot);
        }
        info!("Snapshot channel closed, monitor bridge stopped.");
    });

    server::start_web_server(addr, snapshot_tx).await?;
    Ok(())
}
