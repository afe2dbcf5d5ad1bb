use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::process::Command;

use crate::config::{NotifyConfig, SinkKind};
use crate::notify::{Notification, NotificationSink, NotifyError};

/// Build the sink selected by configuration.
pub fn build_sink(config: &NotifyConfig) -> Arc<dyn NotificationSink> {
    match config.sink {
        SinkKind::Log => Arc::new(LogSink),
        SinkKind::Webhook => Arc::new(WebhookSink::new(&config.webhook_url, config.timeout())),
        SinkKind::Command => Arc::new(CommandSink::new(&config.command)),
    }
}

/// Writes notifications to the log. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), NotifyError>> {
        async move {
            tracing::warn!(
                alert_id = %notification.alert_id,
                open_secs = notification.open_secs,
                title = %notification.title,
                "{}",
                notification.body
            );
            Ok(())
        }
        .boxed()
    }
}

/// POSTs the notification as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.to_string(),
            client,
        }
    }
}

impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), NotifyError>> {
        async move {
            let response = self
                .client
                .post(&self.url)
                .json(notification)
                .send()
                .await
                .map_err(|e| NotifyError::Network(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(NotifyError::Rejected {
                    status: status.as_u16(),
                })
            }
        }
        .boxed()
    }
}

/// Runs a desktop notifier program as `<program> <title> <body>`,
/// e.g. `notify-send`.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
}

impl CommandSink {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl NotificationSink for CommandSink {
    fn name(&self) -> &'static str {
        "command"
    }

    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), NotifyError>> {
        async move {
            let output = Command::new(&self.program)
                .arg(&notification.title)
                .arg(&notification.body)
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| NotifyError::Command(format!("{}: {e}", self.program)))?;

            if output.status.success() {
                return Ok(());
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(NotifyError::Command(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::detection::AlertEvent;

    fn sample_notification() -> Notification {
        let event = AlertEvent {
            at: Duration::from_secs(1),
            openness: 0.004,
            open_for: Duration::from_secs(1),
        };
        Notification::from_alert(&event, Utc::now())
    }

    #[tokio::test]
    async fn log_sink_always_succeeds() {
        let n = sample_notification();
        assert!(LogSink.notify(&n).await.is_ok());
    }

    #[tokio::test]
    async fn missing_command_is_reported() {
        let sink = CommandSink::new("/nonexistent/breath-notifier");
        let n = sample_notification();
        let err = sink.notify(&n).await.unwrap_err();
        assert!(matches!(err, NotifyError::Command(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_exit_status_decides_outcome() {
        let n = sample_notification();
        assert!(CommandSink::new("true").notify(&n).await.is_ok());
        assert!(matches!(
            CommandSink::new("false").notify(&n).await,
            Err(NotifyError::Command(_))
        ));
    }

    #[test]
    fn build_sink_follows_config() {
        let mut cfg = NotifyConfig::default();
        assert_eq!(build_sink(&cfg).name(), "log");
        cfg.sink = SinkKind::Command;
        assert_eq!(build_sink(&cfg).name(), "command");
        cfg.sink = SinkKind::Webhook;
        cfg.webhook_url = "http://127.0.0.1:9/hook".to_string();
        assert_eq!(build_sink(&cfg).name(), "webhook");
    }
}
