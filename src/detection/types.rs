use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 归一化坐标下的二维关键点，x/y 均在 [0, 1] 内
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f64,
    pub y: f64,
}

impl LandmarkPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &LandmarkPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<[f64; 2]> for LandmarkPoint {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

/// 单帧人脸的有序关键点集合，顺序与上游模型的拓扑一致
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandmarkSet {
    points: Vec<LandmarkPoint>,
}

impl LandmarkSet {
    pub fn new(points: Vec<LandmarkPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<LandmarkPoint> {
        self.points.get(index).copied()
    }

    pub fn points(&self) -> &[LandmarkPoint] {
        &self.points
    }
}

impl From<Vec<LandmarkPoint>> for LandmarkSet {
    fn from(points: Vec<LandmarkPoint>) -> Self {
        Self { points }
    }
}

impl From<Vec<[f64; 2]>> for LandmarkSet {
    fn from(raw: Vec<[f64; 2]>) -> Self {
        Self {
            points: raw.into_iter().map(LandmarkPoint::from).collect(),
        }
    }
}

/// 呼吸模式状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreathingState {
    /// 鼻呼吸 / 闭口
    #[default]
    Normal,
    /// 已张口，尚未达到持续时长
    CandidateOpen,
    /// 持续张口，判定为口呼吸
    Detected,
}

impl BreathingState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::CandidateOpen => "candidate_open",
            Self::Detected => "detected",
        }
    }

    /// 是否处于张口阶段（候选或已判定）
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

impl fmt::Display for BreathingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 告警事件，每个检测周期至多产生一次，且受冷却时间约束
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertEvent {
    /// 触发时刻（相对监测起点的单调时间）
    pub at: Duration,
    /// 触发时的张口度
    pub openness: f64,
    /// 触发时已持续张口的时间
    pub open_for: Duration,
}
