//! Alert delivery.
//!
//! The sampling loop hands [`AlertEvent`]s to the [`NotificationDispatcher`],
//! which delivers them to a [`NotificationSink`] off the sampling path.

pub mod dispatcher;
pub mod sinks;

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use uuid::Uuid;

use crate::constants::{NOTIFICATION_BODY, NOTIFICATION_TITLE};
use crate::detection::AlertEvent;

pub use dispatcher::{DispatchOutcome, DispatchStats, NotificationDispatcher};
pub use sinks::{build_sink, CommandSink, LogSink, WebhookSink};

/// What the sink receives for one alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub alert_id: Uuid,
    pub title: String,
    pub body: String,
    pub detected_at: DateTime<Utc>,
    pub open_secs: f64,
    pub openness: f64,
}

impl Notification {
    pub fn from_alert(event: &AlertEvent, detected_at: DateTime<Utc>) -> Self {
        Self {
            alert_id: Uuid::new_v4(),
            title: NOTIFICATION_TITLE.to_string(),
            body: NOTIFICATION_BODY.to_string(),
            detected_at,
            open_secs: event.open_for.as_secs_f64(),
            openness: event.openness,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification timed out after {0:?}")]
    Timeout(Duration),
    #[error("notification network error: {0}")]
    Network(String),
    #[error("notification rejected: status={status}")]
    Rejected { status: u16 },
    #[error("notifier command failed: {0}")]
    Command(String),
}

/// Port for the platform notification sink.
///
/// Implementations must not panic on delivery failure; they report it as a
/// [`NotifyError`] and the dispatcher logs it.
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), NotifyError>>;
}
