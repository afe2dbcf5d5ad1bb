use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_COOLDOWN_SECS, DEFAULT_DISPATCH_QUEUE, DEFAULT_HISTORY_CAPACITY, DEFAULT_LOG_MAX_FILES,
    DEFAULT_NOTIFY_TIMEOUT_SECS, DEFAULT_SAMPLE_RATE, DEFAULT_STATUS_INTERVAL_SECS,
    DEFAULT_SUSTAINED_OPEN_SECS, DEFAULT_THRESHOLD_HIGH, DEFAULT_THRESHOLD_LOW, MAX_SAMPLE_RATE,
};
use crate::detection::{ClassifierConfig, OpennessMetric, Polarity};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    /// 0 = keep every rotated file
    pub log_max_files: usize,
    pub source_path: String,
    pub http_enabled: bool,
    pub detector: DetectorConfig,
    pub sampler: SamplerConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub threshold_high: f64,
    pub threshold_low: f64,
    pub polarity: Polarity,
    pub sustained_open_secs: f64,
    pub cooldown_secs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    pub sample_rate: u32,
    pub metric: OpennessMetric,
    pub smoothing_window: usize,
    pub history_capacity: usize,
    pub status_interval_secs: u64,
    /// 0 = no timeout
    pub frame_timeout_ms: u64,
    /// 0 = run until the source ends or a shutdown signal arrives
    pub session_duration_mins: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SinkKind {
    #[default]
    Log,
    Webhook,
    Command,
}

#[derive(Clone, PartialEq)]
pub struct NotifyConfig {
    pub sink: SinkKind,
    pub webhook_url: String,
    pub command: String,
    pub timeout_secs: u64,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("thresholds must be finite and non-negative (high={high}, low={low})")]
    InvalidThreshold { high: f64, low: f64 },
    #[error("threshold_high ({high}) must be >= threshold_low ({low})")]
    InvertedThresholds { high: f64, low: f64 },
    #[error("{name} must be a finite, non-negative number of seconds, got {value}")]
    InvalidDuration { name: &'static str, value: f64 },
    #[error("sample rate must be between 1 and 1000 ticks per second, got {0}")]
    InvalidSampleRate(u32),
    #[error("history capacity must be at least 1")]
    EmptyHistory,
    #[error("status interval must be at least 1 second")]
    InvalidStatusInterval,
    #[error("dispatch queue capacity must be at least 1")]
    EmptyDispatchQueue,
    #[error("webhook sink selected but BREATH_WEBHOOK_URL is empty")]
    MissingWebhookUrl,
    #[error("command sink selected but BREATH_NOTIFY_COMMAND is empty")]
    MissingNotifyCommand,
}

/// Built-in defaults, identical to `from_env` with no variables set.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 3000,
            log_level: "info".to_string(),
            enable_file_logs: false,
            log_dir: "./logs".to_string(),
            log_max_files: DEFAULT_LOG_MAX_FILES,
            source_path: "-".to_string(),
            http_enabled: false,
            detector: DetectorConfig::default(),
            sampler: SamplerConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_high: DEFAULT_THRESHOLD_HIGH,
            threshold_low: DEFAULT_THRESHOLD_LOW,
            polarity: Polarity::OpenAbove,
            sustained_open_secs: DEFAULT_SUSTAINED_OPEN_SECS,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            metric: OpennessMetric::MouthWidth,
            smoothing_window: 1,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            status_interval_secs: DEFAULT_STATUS_INTERVAL_SECS,
            frame_timeout_ms: 0,
            session_duration_mins: 0,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Log,
            webhook_url: String::new(),
            command: "notify-send".to_string(),
            timeout_secs: DEFAULT_NOTIFY_TIMEOUT_SECS,
            queue_capacity: DEFAULT_DISPATCH_QUEUE,
        }
    }
}

impl fmt::Debug for NotifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // webhook URL 可能内嵌 token
        let webhook_url = if self.webhook_url.is_empty() {
            ""
        } else {
            "***REDACTED***"
        };
        f.debug_struct("NotifyConfig")
            .field("sink", &self.sink)
            .field("webhook_url", &webhook_url)
            .field("command", &self.command)
            .field("timeout_secs", &self.timeout_secs)
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

impl SinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Webhook => "webhook",
            Self::Command => "command",
        }
    }
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "webhook" => Ok(Self::Webhook),
            "command" | "cmd" => Ok(Self::Command),
            other => Err(format!("unknown notification sink: {other}")),
        }
    }
}

impl DetectorConfig {
    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            threshold_high: self.threshold_high,
            threshold_low: self.threshold_low,
            polarity: self.polarity,
            sustained_open: secs_to_duration(self.sustained_open_secs),
            cooldown: secs_to_duration(self.cooldown_secs),
        }
    }
}

impl SamplerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.sample_rate.max(1)))
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }

    pub fn frame_timeout(&self) -> Option<Duration> {
        (self.frame_timeout_ms > 0).then(|| Duration::from_millis(self.frame_timeout_ms))
    }

    pub fn session_limit(&self) -> Option<Duration> {
        (self.session_duration_mins > 0)
            .then(|| Duration::from_secs(self.session_duration_mins.saturating_mul(60)))
    }
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut detector = DetectorConfig {
            threshold_high: env_or_parse("BREATH_THRESHOLD_HIGH", DEFAULT_THRESHOLD_HIGH),
            threshold_low: env_or_parse("BREATH_THRESHOLD_LOW", DEFAULT_THRESHOLD_LOW),
            polarity: env_or_parse("BREATH_POLARITY", Polarity::OpenAbove),
            sustained_open_secs: env_or_parse(
                "BREATH_SUSTAINED_OPEN_SECS",
                DEFAULT_SUSTAINED_OPEN_SECS,
            ),
            cooldown_secs: env_or_parse("BREATH_COOLDOWN_SECS", DEFAULT_COOLDOWN_SECS),
        };
        if let Some(threshold) = env_opt_parse::<f64>("BREATH_OPEN_THRESHOLD") {
            detector.threshold_high = threshold;
            detector.threshold_low = threshold;
        }

        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            log_max_files: env_or_parse("LOG_MAX_FILES", DEFAULT_LOG_MAX_FILES),
            source_path: env_or("BREATH_SOURCE", "-"),
            http_enabled: env_or_bool("BREATH_HTTP_ENABLED", false),
            detector,
            sampler: SamplerConfig {
                sample_rate: env_or_parse("BREATH_SAMPLE_RATE", DEFAULT_SAMPLE_RATE),
                metric: env_or_parse("BREATH_METRIC", OpennessMetric::MouthWidth),
                smoothing_window: env_or_parse("BREATH_SMOOTHING_WINDOW", 1_usize),
                history_capacity: env_or_parse("BREATH_HISTORY_CAPACITY", DEFAULT_HISTORY_CAPACITY),
                status_interval_secs: env_or_parse(
                    "BREATH_STATUS_INTERVAL_SECS",
                    DEFAULT_STATUS_INTERVAL_SECS,
                ),
                frame_timeout_ms: env_or_parse("BREATH_FRAME_TIMEOUT_MS", 0_u64),
                session_duration_mins: env_or_parse("BREATH_MONITOR_DURATION_MINS", 0_u64),
            },
            notify: NotifyConfig {
                sink: env_or_parse("BREATH_NOTIFY_SINK", SinkKind::Log),
                webhook_url: env_or("BREATH_WEBHOOK_URL", ""),
                command: env_or("BREATH_NOTIFY_COMMAND", "notify-send"),
                timeout_secs: env_or_parse(
                    "BREATH_NOTIFY_TIMEOUT_SECS",
                    DEFAULT_NOTIFY_TIMEOUT_SECS,
                ),
                queue_capacity: env_or_parse("BREATH_DISPATCH_QUEUE", DEFAULT_DISPATCH_QUEUE),
            },
        }
    }

    /// Reject inconsistent values before the monitor starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detector;
        let valid_threshold = |t: f64| t.is_finite() && t >= 0.0;
        if !valid_threshold(d.threshold_high) || !valid_threshold(d.threshold_low) {
            return Err(ConfigError::InvalidThreshold {
                high: d.threshold_high,
                low: d.threshold_low,
            });
        }
        if d.threshold_high < d.threshold_low {
            return Err(ConfigError::InvertedThresholds {
                high: d.threshold_high,
                low: d.threshold_low,
            });
        }
        for (name, value) in [
            ("sustained_open_secs", d.sustained_open_secs),
            ("cooldown_secs", d.cooldown_secs),
        ] {
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::InvalidDuration { name, value });
            }
        }

        let s = &self.sampler;
        if s.sample_rate == 0 || s.sample_rate > MAX_SAMPLE_RATE {
            return Err(ConfigError::InvalidSampleRate(s.sample_rate));
        }
        if s.history_capacity == 0 {
            return Err(ConfigError::EmptyHistory);
        }
        if s.status_interval_secs == 0 {
            return Err(ConfigError::InvalidStatusInterval);
        }

        let n = &self.notify;
        if n.queue_capacity == 0 {
            return Err(ConfigError::EmptyDispatchQueue);
        }
        match n.sink {
            SinkKind::Webhook if n.webhook_url.trim().is_empty() => {
                Err(ConfigError::MissingWebhookUrl)
            }
            SinkKind::Command if n.command.trim().is_empty() => {
                Err(ConfigError::MissingNotifyCommand)
            }
            _ => Ok(()),
        }
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_default()
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_opt_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Failed to parse env var, ignoring");
            None
        }
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
