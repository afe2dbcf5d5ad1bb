use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, watch};

use crate::config::Config;
use crate::sampler::MonitorSnapshot;

/// Shared state for the status surface. Read-only with respect to detection:
/// handlers only ever see the latest published snapshot.
#[derive(Clone)]
pub struct AppState {
    snapshot_rx: watch::Receiver<MonitorSnapshot>,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        snapshot_rx: watch::Receiver<MonitorSnapshot>,
        config: &Config,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            snapshot_rx,
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    /// Clone of the most recent snapshot.
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn snapshot_rx(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_follows_publisher() {
        let (tx, rx) = watch::channel(MonitorSnapshot::default());
        let (shutdown_tx, _) = broadcast::channel(4);
        let state = AppState::new(rx, &Config::default(), shutdown_tx);
        assert_eq!(state.snapshot().tick, 0);

        tx.send_replace(MonitorSnapshot {
            tick: 7,
            ..MonitorSnapshot::default()
        });
        assert_eq!(state.snapshot().tick, 7);
    }

    #[tokio::test]
    async fn shutdown_receiver_can_clone() {
        let (_tx, rx) = watch::channel(MonitorSnapshot::default());
        let (shutdown_tx, _) = broadcast::channel(4);
        let state = AppState::new(rx, &Config::default(), shutdown_tx.clone());

        let mut rx1 = state.shutdown_rx();
        let mut rx2 = state.shutdown_rx();
        shutdown_tx.send(()).unwrap();
        rx1.recv().await.unwrap();
        rx2.recv().await.unwrap();
    }
}
