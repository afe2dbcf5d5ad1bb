//! 张口度 (MAR, Mouth Aspect Ratio) 计算模块
//!
//! 从单帧人脸关键点中选取唇部与口角（或脸部上下）关键点，
//! 计算 垂直距离 / 归一化距离：
//! - `MouthWidth`: |上唇中央 - 下唇中央| / |左口角 - 右口角|
//! - `FaceHeight`: |上唇中央 - 内唇线| / |额头 - 下巴|
//! - `ContourBox`: 外唇轮廓包围盒的 高 / 宽
//!
//! 计算是纯函数：无人脸、关键点不足或几何退化（分母为 0）时返回 0，
//! 0 在分类器中一律视为闭口。

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    FACE_BOTTOM, FACE_MESH_LANDMARKS, FACE_TOP, INNER_LOWER_LIP, LOWER_LIP_CENTER,
    MOUTH_CONTOUR, MOUTH_CORNER_LEFT, MOUTH_CORNER_RIGHT, UPPER_LIP_CENTER,
};
use crate::detection::types::LandmarkSet;

/// 张口度的归一化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpennessMetric {
    #[default]
    MouthWidth,
    FaceHeight,
    ContourBox,
}

impl OpennessMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MouthWidth => "mouth_width",
            Self::FaceHeight => "face_height",
            Self::ContourBox => "contour_box",
        }
    }

    /// (垂直配对, 归一化配对)；`ContourBox` 不是两两距离，返回 None
    fn pairs(self) -> Option<((usize, usize), (usize, usize))> {
        match self {
            Self::MouthWidth => Some((
                (UPPER_LIP_CENTER, LOWER_LIP_CENTER),
                (MOUTH_CORNER_LEFT, MOUTH_CORNER_RIGHT),
            )),
            Self::FaceHeight => Some((
                (UPPER_LIP_CENTER, INNER_LOWER_LIP),
                (FACE_TOP, FACE_BOTTOM),
            )),
            Self::ContourBox => None,
        }
    }
}

impl fmt::Display for OpennessMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpennessMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mouth_width" | "mouth" => Ok(Self::MouthWidth),
            "face_height" | "face" => Ok(Self::FaceHeight),
            "contour_box" | "contour" => Ok(Self::ContourBox),
            other => Err(format!("unknown openness metric: {other}")),
        }
    }
}

/// 默认 (`MouthWidth`) 方式计算张口度
pub fn compute(landmarks: Option<&LandmarkSet>) -> f64 {
    compute_with(OpennessMetric::MouthWidth, landmarks)
}

/// 按指定归一化方式计算张口度
pub fn compute_with(metric: OpennessMetric, landmarks: Option<&LandmarkSet>) -> f64 {
    let Some(landmarks) = landmarks else {
        return 0.0;
    };
    if landmarks.len() < FACE_MESH_LANDMARKS {
        return 0.0;
    }

    let Some(((v_a, v_b), (n_a, n_b))) = metric.pairs() else {
        return contour_box_ratio(landmarks);
    };
    let (Some(v_a), Some(v_b), Some(n_a), Some(n_b)) = (
        landmarks.get(v_a),
        landmarks.get(v_b),
        landmarks.get(n_a),
        landmarks.get(n_b),
    ) else {
        return 0.0;
    };

    let normalizer = n_a.distance(&n_b);
    if !normalizer.is_finite() || normalizer <= 0.0 {
        return 0.0;
    }

    let ratio = v_a.distance(&v_b) / normalizer;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

fn contour_box_ratio(landmarks: &LandmarkSet) -> f64 {
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for &idx in MOUTH_CONTOUR.iter() {
        let Some(p) = landmarks.get(idx) else {
            return 0.0;
        };
        if !p.x.is_finite() || !p.y.is_finite() {
            return 0.0;
        }
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }

    let width = max_x - min_x;
    if !width.is_finite() || width <= 0.0 {
        return 0.0;
    }
    let ratio = (max_y - min_y) / width;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// 固定窗口的移动平均，用于抑制逐帧抖动
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: VecDeque<f64>,
    size: usize,
}

impl MovingAverage {
    /// `size` 为 0 时按 1 处理（即不平滑）
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            window: VecDeque::with_capacity(size),
            size,
        }
    }

    /// 压入新样本并返回当前窗口均值
    pub fn update(&mut self, value: f64) -> f64 {
        self.window.push_back(value);
        while self.window.len() > self.size {
            self.window.pop_front();
        }
        self.average()
    }

    pub fn average(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.window.iter().sum();
        sum / self.window.len() as f64
    }

    pub fn window_size(&self) -> usize {
        self.size
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}
