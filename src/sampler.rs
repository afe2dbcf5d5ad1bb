//! Sampling loop.
//!
//! Drives the tick cadence and owns every piece of mutable detection state:
//! the classifier, the smoother, session statistics and the rolling history.
//! Each tick: read one frame → compute openness → advance the classifier →
//! hand any alert to the dispatcher (never awaited) → publish a snapshot.
//!
//! Durations are measured on the monotonic clock, not by counting ticks, so a
//! slow frame read does not distort sustained-open or cooldown math. Missed
//! ticks are not replayed (`MissedTickBehavior::Delay`).

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::SamplerConfig;
use crate::constants::SOURCE_FAILURE_LOG_EVERY;
use crate::detection::classifier::ClassifierConfig;
use crate::detection::openness::{self, MovingAverage, OpennessMetric};
use crate::detection::{BreathingState, LandmarkSet, ModeClassifier, MouthLevel, TickOutcome};
use crate::notify::{DispatchOutcome, NotificationDispatcher};
use crate::source::{Frame, LandmarkSource, SourceError};

/// In-memory counters for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub no_face_ticks: u64,
    pub episodes: u64,
    pub alerts_emitted: u64,
    pub alerts_suppressed: u64,
    pub alerts_dropped: u64,
    pub open_secs_total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub elapsed_secs: f64,
    pub openness: f64,
    pub state: BreathingState,
}

/// Read-only copy of the loop's state, published once per tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub tick: u64,
    pub elapsed_secs: f64,
    pub openness: f64,
    pub state: BreathingState,
    pub level: MouthLevel,
    pub face_present: bool,
    pub source_healthy: bool,
    pub open_secs: Option<f64>,
    pub last_alert_secs: Option<f64>,
    pub stats: SessionStats,
    #[serde(skip_serializing)]
    pub history: Vec<HistoryPoint>,
}

impl Default for MonitorSnapshot {
    fn default() -> Self {
        Self {
            tick: 0,
            elapsed_secs: 0.0,
            openness: 0.0,
            state: BreathingState::Normal,
            level: MouthLevel::Closed,
            face_present: false,
            source_healthy: true,
            open_secs: None,
            last_alert_secs: None,
            stats: SessionStats::default(),
            history: Vec::new(),
        }
    }
}

pub struct SamplingLoop<S> {
    source: S,
    classifier: ModeClassifier,
    smoother: MovingAverage,
    metric: OpennessMetric,
    config: SamplerConfig,
    dispatcher: NotificationDispatcher,
    snapshot_tx: watch::Sender<MonitorSnapshot>,
    history: VecDeque<HistoryPoint>,
    stats: SessionStats,
    consecutive_failures: u32,
    last_processed: Option<(Duration, BreathingState)>,
    last_sample: f64,
    face_present: bool,
}

impl<S: LandmarkSource> SamplingLoop<S> {
    pub fn new(
        source: S,
        classifier_config: ClassifierConfig,
        config: SamplerConfig,
        dispatcher: NotificationDispatcher,
    ) -> (Self, watch::Receiver<MonitorSnapshot>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(MonitorSnapshot::default());
        let sampler = Self {
            source,
            classifier: ModeClassifier::new(classifier_config),
            smoother: MovingAverage::new(config.smoothing_window),
            metric: config.metric,
            history: VecDeque::with_capacity(config.history_capacity),
            config,
            dispatcher,
            snapshot_tx,
            stats: SessionStats::default(),
            consecutive_failures: 0,
            last_processed: None,
            last_sample: 0.0,
            face_present: false,
        };
        (sampler, snapshot_rx)
    }

    /// Run until shutdown, until the source ends, or until the configured
    /// session length elapses. Returns the session totals.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> SessionStats {
        let epoch = Instant::now();
        let deadline = self.config.session_limit().map(|limit| epoch + limit);
        let session_mins = self.config.session_duration_mins;
        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let status_every = self.config.status_interval();
        let mut next_status = status_every;

        tracing::info!(
            sample_rate = self.config.sample_rate,
            metric = %self.metric,
            "Sampling loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown_rx.recv() => break,
                _ = session_end(deadline) => {
                    tracing::info!(minutes = session_mins, "Session duration reached");
                    break;
                }
            }

            let frame = tokio::select! {
                frame = self.read_frame() => frame,
                _ = shutdown_rx.recv() => break,
                _ = session_end(deadline) => {
                    tracing::info!(minutes = session_mins, "Session duration reached");
                    break;
                }
            };
            let now = epoch.elapsed();

            if self.handle(frame, now).is_break() {
                break;
            }

            if now >= next_status {
                self.log_status(now);
                next_status = now + status_every;
            }
        }

        tracing::info!(
            ticks = self.stats.ticks,
            skipped = self.stats.skipped_ticks,
            episodes = self.stats.episodes,
            alerts = self.stats.alerts_emitted,
            "Sampling loop stopped"
        );
        self.stats
    }

    async fn read_frame(&mut self) -> Result<Frame, SourceError> {
        match self.config.frame_timeout() {
            Some(limit) => match tokio::time::timeout(limit, self.source.next_frame()).await {
                Ok(frame) => frame,
                Err(_) => Err(SourceError::Timeout(limit)),
            },
            None => self.source.next_frame().await,
        }
    }

    /// Apply one tick's read result at monotonic time `now`.
    pub fn handle(&mut self, frame: Result<Frame, SourceError>, now: Duration) -> ControlFlow<()> {
        match frame {
            Ok(Frame::Face(landmarks)) => {
                self.recovered();
                self.face_present = true;
                self.process(Some(&landmarks), now);
            }
            Ok(Frame::NoFace) => {
                self.recovered();
                self.face_present = false;
                self.stats.no_face_ticks += 1;
                self.process(None, now);
            }
            Ok(Frame::EndOfStream) => {
                tracing::info!("Landmark source reached end of stream");
                return ControlFlow::Break(());
            }
            Err(SourceError::Closed) => {
                tracing::warn!("Landmark source closed");
                return ControlFlow::Break(());
            }
            Err(e) => self.skip(e, now),
        }
        ControlFlow::Continue(())
    }

    fn process(&mut self, landmarks: Option<&LandmarkSet>, now: Duration) {
        let raw = openness::compute_with(self.metric, landmarks);
        // 无人脸 / 几何退化得到的 0 与非有限值不进入平滑窗口：
        // 清空窗口，原值直接交给分类器按闭口处理
        let sample = if raw.is_finite() && raw > 0.0 {
            self.smoother.update(raw)
        } else {
            self.smoother.reset();
            raw
        };

        let outcome = self.classifier.update(sample, now);
        self.accumulate_open_time(now, outcome.state);
        self.stats.ticks += 1;
        self.last_sample = sample;
        self.record(&outcome, sample, now);
        self.publish(now);
    }

    fn record(&mut self, outcome: &TickOutcome, sample: f64, now: Duration) {
        if outcome.transitioned() {
            tracing::debug!(
                from = %outcome.previous,
                to = %outcome.state,
                openness = sample,
                elapsed_secs = now.as_secs_f64(),
                "Breathing state changed"
            );
        }

        if outcome.entered_detection() {
            self.stats.episodes += 1;
        }

        if let Some(alert) = outcome.alert {
            self.stats.alerts_emitted += 1;
            tracing::info!(
                openness = alert.openness,
                open_secs = alert.open_for.as_secs_f64(),
                "Mouth breathing detected"
            );
            if self.dispatcher.dispatch(alert) != DispatchOutcome::Queued {
                self.stats.alerts_dropped += 1;
            }
        } else if outcome.suppressed {
            self.stats.alerts_suppressed += 1;
            tracing::info!(
                openness = sample,
                "Mouth breathing detected, alert suppressed by cooldown"
            );
        }

        self.history.push_back(HistoryPoint {
            elapsed_secs: now.as_secs_f64(),
            openness: sample,
            state: outcome.state,
        });
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }
    }

    /// 相邻两次有效 tick 之间，若前一次处于张口阶段，则计入累计张口时间。
    /// 中间有被跳过的 tick 时不计入（`skip` 会清空 `last_processed`）
    fn accumulate_open_time(&mut self, now: Duration, state: BreathingState) {
        if let Some((prev_at, prev_state)) = self.last_processed {
            if prev_state.is_open() {
                self.stats.open_secs_total += now.saturating_sub(prev_at).as_secs_f64();
            }
        }
        self.last_processed = Some((now, state));
    }

    fn skip(&mut self, error: SourceError, now: Duration) {
        self.stats.skipped_ticks += 1;
        self.consecutive_failures += 1;
        self.last_processed = None;

        if self.consecutive_failures == 1 {
            tracing::warn!(error = %error, "Frame read failed, skipping tick");
        } else if self.consecutive_failures % SOURCE_FAILURE_LOG_EVERY == 0 {
            tracing::warn!(
                error = %error,
                consecutive_failures = self.consecutive_failures,
                "Landmark source still unavailable"
            );
        }
        self.publish(now);
    }

    fn recovered(&mut self) {
        if self.consecutive_failures > 0 {
            tracing::info!(
                failed_ticks = self.consecutive_failures,
                "Landmark source recovered"
            );
            self.consecutive_failures = 0;
        }
    }

    fn publish(&self, now: Duration) {
        let classifier = self.classifier.snapshot(now);
        self.snapshot_tx.send_replace(MonitorSnapshot {
            tick: self.stats.ticks,
            elapsed_secs: now.as_secs_f64(),
            openness: self.last_sample,
            state: classifier.state,
            level: classifier.level,
            face_present: self.face_present,
            source_healthy: self.consecutive_failures == 0,
            open_secs: classifier.open_for.map(|d| d.as_secs_f64()),
            last_alert_secs: classifier.last_alert.map(|d| d.as_secs_f64()),
            stats: self.stats,
            history: self.history.iter().copied().collect(),
        });
    }

    fn log_status(&self, now: Duration) {
        tracing::info!(
            elapsed_secs = %format!("{:.1}", now.as_secs_f64()),
            openness = %format!("{:.4}", self.last_sample),
            state = %self.classifier.state(),
            face = self.face_present,
            "Breathing status"
        );
    }
}

async fn session_end(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::NotifyConfig;
    use crate::constants::{FACE_MESH_LANDMARKS, LOWER_LIP_CENTER, MOUTH_CORNER_LEFT, MOUTH_CORNER_RIGHT};
    use crate::detection::classifier::Polarity;
    use crate::detection::LandmarkPoint;
    use crate::notify::LogSink;

    struct Silent;

    impl LandmarkSource for Silent {
        async fn next_frame(&mut self) -> Result<Frame, SourceError> {
            Ok(Frame::NoFace)
        }
    }

    /// 口宽 0.2，唇距 = mar * 0.2
    fn face(mar: f64) -> Frame {
        let mut points = vec![LandmarkPoint::new(0.5, 0.5); FACE_MESH_LANDMARKS];
        points[MOUTH_CORNER_LEFT] = LandmarkPoint::new(0.4, 0.5);
        points[MOUTH_CORNER_RIGHT] = LandmarkPoint::new(0.6, 0.5);
        points[LOWER_LIP_CENTER] = LandmarkPoint::new(0.5, 0.5 + mar * 0.2);
        Frame::Face(LandmarkSet::new(points))
    }

    fn sampler(
        config: SamplerConfig,
    ) -> (SamplingLoop<Silent>, watch::Receiver<MonitorSnapshot>) {
        sampler_with(ClassifierConfig::default(), config)
    }

    fn sampler_with(
        classifier: ClassifierConfig,
        config: SamplerConfig,
    ) -> (SamplingLoop<Silent>, watch::Receiver<MonitorSnapshot>) {
        let (dispatcher, _handle) =
            NotificationDispatcher::spawn(Arc::new(LogSink), &NotifyConfig::default());
        SamplingLoop::new(Silent, classifier, config, dispatcher)
    }

    fn at(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[tokio::test]
    async fn read_failure_skips_classification() {
        let (mut s, rx) = sampler(SamplerConfig::default());

        assert!(s.handle(Ok(face(0.01)), at(0)).is_continue());
        let err = SourceError::Unavailable("camera busy".into());
        assert!(s.handle(Err(err), at(100)).is_continue());

        let snap = rx.borrow().clone();
        assert_eq!(snap.tick, 1);
        assert_eq!(snap.stats.skipped_ticks, 1);
        assert!(!snap.source_healthy);
        assert_eq!(snap.state, BreathingState::CandidateOpen);

        s.handle(Ok(face(0.01)), at(1000));
        let snap = rx.borrow().clone();
        assert!(snap.source_healthy);
        assert_eq!(snap.state, BreathingState::Detected);
        assert_eq!(snap.stats.alerts_emitted, 1);
    }

    #[tokio::test]
    async fn no_face_counts_as_closed() {
        let (mut s, rx) = sampler(SamplerConfig::default());
        s.handle(Ok(face(0.01)), at(0));
        s.handle(Ok(Frame::NoFace), at(100));

        let snap = rx.borrow().clone();
        assert_eq!(snap.state, BreathingState::Normal);
        assert!(!snap.face_present);
        assert_eq!(snap.stats.no_face_ticks, 1);
    }

    #[tokio::test]
    async fn end_of_stream_and_closed_source_stop_the_loop() {
        let (mut s, _rx) = sampler(SamplerConfig::default());
        assert!(s.handle(Ok(Frame::EndOfStream), at(0)).is_break());
        assert!(s.handle(Err(SourceError::Closed), at(0)).is_break());
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let config = SamplerConfig {
            history_capacity: 5,
            ..SamplerConfig::default()
        };
        let (mut s, rx) = sampler(config);
        for i in 0..12 {
            s.handle(Ok(Frame::NoFace), at(i * 100));
        }
        let snap = rx.borrow().clone();
        assert_eq!(snap.history.len(), 5);
        assert_eq!(snap.history[0].elapsed_secs, 0.7);
    }

    #[tokio::test]
    async fn open_time_accumulates_while_open() {
        let (mut s, rx) = sampler(SamplerConfig::default());
        s.handle(Ok(face(0.01)), at(0));
        s.handle(Ok(face(0.01)), at(500));
        s.handle(Ok(face(0.01)), at(1500));
        s.handle(Ok(face(0.0)), at(2000));
        s.handle(Ok(face(0.0)), at(3000));

        let stats = rx.borrow().stats;
        assert!((stats.open_secs_total - 2.0).abs() < 1e-9);
        assert_eq!(stats.episodes, 1);
    }

    #[tokio::test]
    async fn smoothing_delays_detection_onset() {
        let config = SamplerConfig {
            smoothing_window: 4,
            ..SamplerConfig::default()
        };
        let (mut s, rx) = sampler(config);
        for i in 0..3 {
            s.handle(Ok(face(0.0005)), at(i * 100));
        }
        // 均值 (0.0005*3 + 0.005)/4 = 0.001625，仍处于死区
        s.handle(Ok(face(0.005)), at(300));
        assert_eq!(rx.borrow().state, BreathingState::Normal);
        s.handle(Ok(face(0.005)), at(400));
        assert_eq!(rx.borrow().state, BreathingState::CandidateOpen);
    }

    #[tokio::test]
    async fn no_face_resets_smoothing_window() {
        let config = SamplerConfig {
            smoothing_window: 4,
            ..SamplerConfig::default()
        };
        let (mut s, rx) = sampler(config);
        for i in 0..10 {
            s.handle(Ok(face(0.004)), at(i * 100));
        }
        assert_eq!(rx.borrow().state, BreathingState::CandidateOpen);

        // 窗口若保留旧值，均值 0.003 仍为张口，会在 t=1.0 误报
        s.handle(Ok(Frame::NoFace), at(1000));
        let snap = rx.borrow().clone();
        assert_eq!(snap.state, BreathingState::Normal);
        assert_eq!(snap.openness, 0.0);
        assert_eq!(snap.stats.alerts_emitted, 0);

        // 人脸重新出现后从空窗口开始平滑
        s.handle(Ok(face(0.004)), at(1100));
        assert!((rx.borrow().openness - 0.004).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_face_never_smooths_into_open_below_polarity() {
        let classifier = ClassifierConfig {
            polarity: Polarity::OpenBelow,
            ..ClassifierConfig::default()
        };
        let config = SamplerConfig {
            smoothing_window: 20,
            ..SamplerConfig::default()
        };
        let (mut s, rx) = sampler_with(classifier, config);

        // 0.0025 高于 threshold_high，闭口
        s.handle(Ok(face(0.0025)), at(0));
        for i in 1..40 {
            s.handle(Ok(Frame::NoFace), at(i * 100));
            assert_eq!(rx.borrow().state, BreathingState::Normal, "tick {i}");
        }
        let stats = rx.borrow().stats;
        assert_eq!(stats.episodes, 0);
        assert_eq!(stats.alerts_emitted, 0);
    }

    #[tokio::test]
    async fn open_time_excludes_skipped_ticks() {
        let (mut s, rx) = sampler(SamplerConfig::default());
        s.handle(Ok(face(0.01)), at(0));
        s.handle(Ok(face(0.01)), at(500));
        s.handle(Err(SourceError::Timeout(at(100))), at(600));
        // 读取恢复时已过去 5 秒，这段空档不计入张口时间
        s.handle(Ok(face(0.01)), at(5500));
        s.handle(Ok(face(0.01)), at(6000));

        let stats = rx.borrow().stats;
        assert!(
            (stats.open_secs_total - 1.0).abs() < 1e-9,
            "open_secs_total = {}",
            stats.open_secs_total
        );
        assert_eq!(stats.skipped_ticks, 1);
    }
}
