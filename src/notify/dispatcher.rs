//! Notification dispatcher.
//!
//! A single persistent worker drains a bounded queue fed by the sampling loop.
//! `dispatch` never waits: a full queue drops the alert instead of building a
//! backlog of stale notifications.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::NotifyConfig;
use crate::detection::AlertEvent;
use crate::notify::{Notification, NotificationSink, NotifyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued,
    /// Queue full; the alert was dropped.
    Dropped,
    /// Worker is gone; the alert was dropped.
    Closed,
}

/// Totals reported by the worker when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
}

pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
}

impl NotificationDispatcher {
    /// Spawn the delivery worker. The worker exits once every dispatcher handle
    /// is dropped and the queue is drained.
    pub fn spawn(
        sink: Arc<dyn NotificationSink>,
        config: &NotifyConfig,
    ) -> (Self, JoinHandle<DispatchStats>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let handle = tokio::spawn(run_worker(rx, sink, config.timeout()));
        (Self { tx }, handle)
    }

    pub fn dispatch(&self, event: AlertEvent) -> DispatchOutcome {
        let notification = Notification::from_alert(&event, Utc::now());
        let alert_id = notification.alert_id;

        match self.tx.try_send(notification) {
            Ok(()) => DispatchOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%alert_id, "Notification queue full, dropping alert");
                DispatchOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!(%alert_id, "Notification worker stopped, dropping alert");
                DispatchOutcome::Closed
            }
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Notification>,
    sink: Arc<dyn NotificationSink>,
    timeout: Duration,
) -> DispatchStats {
    let mut stats = DispatchStats::default();
    tracing::info!(sink = sink.name(), "Notification worker started");

    while let Some(notification) = rx.recv().await {
        let result = match tokio::time::timeout(timeout, sink.notify(&notification)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(timeout)),
        };

        match result {
            Ok(()) => {
                stats.delivered += 1;
                tracing::info!(
                    alert_id = %notification.alert_id,
                    sink = sink.name(),
                    "Notification delivered"
                );
            }
            Err(e) => {
                // 投递失败不重试：过期的告警不再补发
                stats.failed += 1;
                tracing::error!(
                    error = %e,
                    alert_id = %notification.alert_id,
                    sink = sink.name(),
                    "Notification delivery failed"
                );
            }
        }
    }

    tracing::info!(
        delivered = stats.delivered,
        failed = stats.failed,
        "Notification worker stopped"
    );
    stats
}
