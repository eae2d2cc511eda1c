//! Hot-plug watcher for MIDI output ports
//!
//! `midir` has no connect/disconnect callback, so the platform is polled on a
//! Tokio task and a change is emitted only when the set of ports differs.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{refresh, EndpointInfo, EndpointSet, MidiPlatform};

/// A refreshed endpoint set and what changed since the previous one
#[derive(Debug, Clone)]
pub struct DeviceChange {
    pub set: EndpointSet,
    pub added: Vec<EndpointInfo>,
    pub removed: Vec<EndpointInfo>,
}

/// Watches the platform for port changes and forwards them on a channel
pub struct DeviceWatcher {
    task: JoinHandle<()>,
    rx: mpsc::Receiver<DeviceChange>,
}

impl DeviceWatcher {
    /// Start polling every `interval`, reporting changes against `initial`
    pub fn spawn(platform: Arc<dyn MidiPlatform>, initial: EndpointSet, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(16);

        let watched = initial.len();
        let mut known = initial;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick fires immediately and would only repeat the initial listing
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let set = match platform.output_endpoints() {
                    Ok(raw) => refresh(raw),
                    Err(e) => {
                        warn!("Failed to list MIDI outputs: {}", e);
                        continue;
                    }
                };

                if set == known {
                    continue;
                }

                let (added, removed) = set.diff(&known);
                for endpoint in added.iter().chain(&removed) {
                    info!("MIDI port {} {}", endpoint.name, endpoint.state);
                }

                known = set.clone();
                if tx.send(DeviceChange { set, added, removed }).await.is_err() {
                    debug!("Device watcher receiver dropped, stopping");
                    break;
                }
            }
        });

        info!(
            "Device watcher started ({} output ports, polling every {:?})",
            watched,
            interval
        );

        Self { task, rx }
    }

    /// Wait for the next change. Returns None once the watcher has stopped.
    pub async fn next_change(&mut self) -> Option<DeviceChange> {
        self.rx.recv().await
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
