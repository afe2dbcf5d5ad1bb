//! 口呼吸检测核心
//!
//! ## 模块
//! - `types`: 关键点、状态、告警事件
//! - `openness`: MAR (Mouth Aspect Ratio) 张口度计算
//! - `classifier`: 滞回阈值 + 持续时长 + 冷却的状态机

pub mod classifier;
pub mod openness;
pub mod types;

pub use classifier::{ClassifierConfig, ModeClassifier, MouthLevel, Polarity, TickOutcome};
pub use openness::{MovingAverage, OpennessMetric};
pub use types::{AlertEvent, BreathingState, LandmarkPoint, LandmarkSet};
