//! The simulation-side half of the monitor: a thread that samples the host's
//! diagnostics and pushes snapshots into a channel without ever blocking.

use crate::model::DiagnosticSnapshot;
use crossbeam_channel::{Sender, TrySendError, bounded, select, tick};
use log::{debug, trace, warn};
use plcsim_rs::ServerHost;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Builds one snapshot of `host`.
pub fn snapshot(host: &ServerHost, sequence: u64, started: Instant) -> DiagnosticSnapshot {
    let uptime_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    DiagnosticSnapshot::from_diagnostics(
        sequence,
        uptime_ms,
        &host.diagnostics(),
        host.server_item_count(),
    )
}

/// Handle of the publisher thread. Dropping it stops the thread.
pub struct SnapshotPublisher {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotPublisher {
    /// Publishes a snapshot of `host` every `period`. Snapshots are dropped
    /// while the channel is full, so a slow monitor never stalls the simulation.
    pub fn spawn(
        host: Arc<ServerHost>,
        period: Duration,
        sender: Sender<DiagnosticSnapshot>,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let ticker = tick(period);
        let handle = thread::Builder::new()
            .name("monitor-publisher".into())
            .spawn(move || {
                let started = Instant::now();
                let mut sequence = 0u64;
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            sequence += 1;
                            match sender.try_send(snapshot(&host, sequence, started)) {
                                Ok(()) => trace!("Snapshot {} published", sequence),
                                Err(TrySendError::Full(_)) => {
                                    debug!("Monitor is lagging, snapshot {} dropped", sequence);
                                }
                                Err(TrySendError::Disconnected(_)) => {
                                    warn!("Monitor channel closed, publisher exiting");
                                    break;
                                }
                            }
                        }
                    }
                }
            })?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stops the thread and waits for it. Safe to call twice.
    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Publisher thread ended abnormally");
            }
        }
    }
}

impl Drop for SnapshotPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plcsim_rs::SimulationConfig;

    fn host() -> Arc<ServerHost> {
        let config = SimulationConfig {
            autostart: false,
            ..SimulationConfig::default()
        };
        let host = ServerHost::with_config(&config).unwrap();
        host.start().unwrap();
        Arc::new(host)
    }

    #[test]
    fn test_snapshot_covers_every_manager() {
        let host = host();
        let snapshot = snapshot(&host, 1, Instant::now());
        let names: Vec<_> = snapshot.managers.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["plc", "alarm"]);
        assert!(snapshot.managers.iter().all(|m| m.node_count > 0));
        assert_eq!(snapshot.groups.len(), 3);
        assert_eq!(snapshot.managers[1].alarm_cursor, Some(0));
    }

    #[test]
    fn test_publisher_sends_until_stopped() {
        let host = host();
        let (tx, rx) = bounded(4);
        let mut publisher = SnapshotPublisher::spawn(host, Duration::from_millis(5), tx).unwrap();
        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(second.sequence > first.sequence);
        publisher.stop();
        publisher.stop();
    }
}
