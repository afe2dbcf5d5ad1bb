use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use breath_monitor::constants::{
    FACE_MESH_LANDMARKS, LOWER_LIP_CENTER, MOUTH_CORNER_LEFT, MOUTH_CORNER_RIGHT,
    UPPER_LIP_CENTER,
};
use breath_monitor::detection::{LandmarkPoint, LandmarkSet};
use breath_monitor::notify::{Notification, NotificationSink, NotifyError};
use breath_monitor::source::{Frame, LandmarkSource, SourceError};

/// 468 点人脸，口宽 0.2，唇距 `mar * 0.2`，即 MAR 恰为 `mar`
pub fn face_with_mar(mar: f64) -> LandmarkSet {
    let mut points = vec![LandmarkPoint::new(0.5, 0.5); FACE_MESH_LANDMARKS];
    points[MOUTH_CORNER_LEFT] = LandmarkPoint::new(0.4, 0.6);
    points[MOUTH_CORNER_RIGHT] = LandmarkPoint::new(0.6, 0.6);
    points[UPPER_LIP_CENTER] = LandmarkPoint::new(0.5, 0.55);
    points[LOWER_LIP_CENTER] = LandmarkPoint::new(0.5, 0.55 + mar * 0.2);
    LandmarkSet::new(points)
}

pub fn open_frame() -> Result<Frame, SourceError> {
    Ok(Frame::Face(face_with_mar(0.004)))
}

pub fn closed_frame() -> Result<Frame, SourceError> {
    Ok(Frame::Face(face_with_mar(0.0005)))
}

/// Replays a fixed script of frames, then reports end of stream.
pub struct ScriptedSource {
    frames: VecDeque<Result<Frame, SourceError>>,
    delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = Result<Frame, SourceError>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            delay: None,
        }
    }

    /// Every read sleeps for `delay` before returning.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl LandmarkSource for ScriptedSource {
    async fn next_frame(&mut self) -> Result<Frame, SourceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.frames.pop_front().unwrap_or(Ok(Frame::EndOfStream))
    }
}

/// Never yields a frame.
pub struct StalledSource;

impl LandmarkSource for StalledSource {
    async fn next_frame(&mut self) -> Result<Frame, SourceError> {
        futures::future::pending().await
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub received: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn count(&self) -> usize {
        self.received.lock().expect("lock").len()
    }
}

impl NotificationSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn notify<'a>(&'a self, n: &'a Notification) -> BoxFuture<'a, Result<(), NotifyError>> {
        self.received.lock().expect("lock").push(n.clone());
        async { Ok(()) }.boxed()
    }
}

pub struct FailingSink;

impl NotificationSink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn notify<'a>(&'a self, _n: &'a Notification) -> BoxFuture<'a, Result<(), NotifyError>> {
        async { Err(NotifyError::Network("connection refused".to_string())) }.boxed()
    }
}
