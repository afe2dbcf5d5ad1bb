//! 口呼吸判定状态机
//!
//! 两级结构：
//! 1. 滞回锁存 (`HysteresisLatch`)：上下两个阈值之间为死区，死区内保持上一次的
//!    张口/闭口判定，避免在单一阈值附近抖动。
//! 2. 三状态机：Normal → CandidateOpen → Detected
//!    - 张口的瞬间进入 CandidateOpen 并记录起点
//!    - 连续张口达到 `sustained_open` 后进入 Detected
//!    - 任意一帧闭口立即回到 Normal，计时清零（不保留部分进度）
//!    - 每次 CandidateOpen → Detected 时尝试告警，受 `cooldown` 约束
//!
//! 时间戳一律使用调用方注入的单调时间（相对监测起点的 `Duration`），
//! 分类器本身不读时钟，相同输入必然得到相同输出。

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_COOLDOWN_SECS, DEFAULT_SUSTAINED_OPEN_SECS, DEFAULT_THRESHOLD_HIGH,
    DEFAULT_THRESHOLD_LOW,
};
use crate::detection::types::{AlertEvent, BreathingState};

/// 阈值极性：张口时 MAR 是偏高还是偏低
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// sample >= high 为张口，sample <= low 为闭口
    #[default]
    OpenAbove,
    /// sample <= low 为张口，sample >= high 为闭口
    OpenBelow,
}

impl Polarity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAbove => "above",
            Self::OpenBelow => "below",
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Polarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "above" | "open_above" | "high" => Ok(Self::OpenAbove),
            "below" | "open_below" | "low" => Ok(Self::OpenBelow),
            other => Err(format!("unknown polarity: {other}")),
        }
    }
}

/// 锁存后的张口/闭口判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouthLevel {
    Closed,
    Open,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub threshold_high: f64,
    pub threshold_low: f64,
    pub polarity: Polarity,
    pub sustained_open: Duration,
    pub cooldown: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold_high: DEFAULT_THRESHOLD_HIGH,
            threshold_low: DEFAULT_THRESHOLD_LOW,
            polarity: Polarity::OpenAbove,
            sustained_open: Duration::from_secs_f64(DEFAULT_SUSTAINED_OPEN_SECS),
            cooldown: Duration::from_secs_f64(DEFAULT_COOLDOWN_SECS),
        }
    }
}

/// 双阈值滞回锁存
#[derive(Debug, Clone)]
pub struct HysteresisLatch {
    high: f64,
    low: f64,
    polarity: Polarity,
    level: MouthLevel,
}

impl HysteresisLatch {
    pub fn new(high: f64, low: f64, polarity: Polarity) -> Self {
        Self {
            high,
            low,
            polarity,
            level: MouthLevel::Closed,
        }
    }

    /// 输入一个样本，返回锁存后的判定。
    ///
    /// 非有限值、负值和 0（提取器的"无信号"）强制视为闭口。
    /// 两个阈值相等时，恰好落在阈值上的样本判为张口。
    pub fn feed(&mut self, sample: f64) -> MouthLevel {
        if !sample.is_finite() || sample <= 0.0 {
            self.level = MouthLevel::Closed;
            return self.level;
        }

        let (is_open, is_closed) = match self.polarity {
            Polarity::OpenAbove => (sample >= self.high, sample <= self.low),
            Polarity::OpenBelow => (sample <= self.low, sample >= self.high),
        };

        if is_open {
            self.level = MouthLevel::Open;
        } else if is_closed {
            self.level = MouthLevel::Closed;
        }
        // 死区：保持上一次判定
        self.level
    }

    pub fn level(&self) -> MouthLevel {
        self.level
    }

    pub fn reset(&mut self) {
        self.level = MouthLevel::Closed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Normal,
    CandidateOpen { since: Duration },
    Detected { since: Duration },
}

impl Phase {
    fn state(self) -> BreathingState {
        match self {
            Phase::Normal => BreathingState::Normal,
            Phase::CandidateOpen { .. } => BreathingState::CandidateOpen,
            Phase::Detected { .. } => BreathingState::Detected,
        }
    }

    fn open_since(self) -> Option<Duration> {
        match self {
            Phase::Normal => None,
            Phase::CandidateOpen { since } | Phase::Detected { since } => Some(since),
        }
    }
}

/// 单次 tick 的结果
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub previous: BreathingState,
    pub state: BreathingState,
    pub level: MouthLevel,
    /// 本次 tick 产生的告警
    pub alert: Option<AlertEvent>,
    /// 本次 tick 进入 Detected 但告警被冷却抑制
    pub suppressed: bool,
}

impl TickOutcome {
    pub fn transitioned(&self) -> bool {
        self.previous != self.state
    }

    /// 本次 tick 是否进入 Detected（无论是否告警）
    pub fn entered_detection(&self) -> bool {
        self.state == BreathingState::Detected && self.previous != BreathingState::Detected
    }
}

/// 供展示层读取的只读快照
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierSnapshot {
    pub state: BreathingState,
    pub level: MouthLevel,
    pub open_for: Option<Duration>,
    pub last_alert: Option<Duration>,
}

/// 口呼吸判定器
///
/// 由采样循环独占持有，每个 tick 调用一次 `update`。
#[derive(Debug, Clone)]
pub struct ModeClassifier {
    config: ClassifierConfig,
    latch: HysteresisLatch,
    phase: Phase,
    last_alert: Option<Duration>,
}

impl ModeClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let latch = HysteresisLatch::new(config.threshold_high, config.threshold_low, config.polarity);
        Self {
            config,
            latch,
            phase: Phase::Normal,
            last_alert: None,
        }
    }

    /// 输入当前样本与单调时间戳，推进状态机
    pub fn update(&mut self, sample: f64, now: Duration) -> TickOutcome {
        let previous = self.phase.state();
        let level = self.latch.feed(sample);
        let mut alert = None;
        let mut suppressed = false;

        self.phase = match (self.phase, level) {
            (_, MouthLevel::Closed) => Phase::Normal,
            (Phase::Normal, MouthLevel::Open) => Phase::CandidateOpen { since: now },
            (Phase::CandidateOpen { since }, MouthLevel::Open) => {
                let open_for = now.saturating_sub(since);
                if open_for >= self.config.sustained_open {
                    if self.cooldown_expired(now) {
                        self.last_alert = Some(now);
                        alert = Some(AlertEvent {
                            at: now,
                            openness: sample,
                            open_for,
                        });
                    } else {
                        suppressed = true;
                    }
                    Phase::Detected { since }
                } else {
                    Phase::CandidateOpen { since }
                }
            }
            (detected @ Phase::Detected { .. }, MouthLevel::Open) => detected,
        };

        TickOutcome {
            previous,
            state: self.phase.state(),
            level,
            alert,
            suppressed,
        }
    }

    fn cooldown_expired(&self, now: Duration) -> bool {
        match self.last_alert {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.config.cooldown,
        }
    }

    pub fn state(&self) -> BreathingState {
        self.phase.state()
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn last_alert(&self) -> Option<Duration> {
        self.last_alert
    }

    pub fn snapshot(&self, now: Duration) -> ClassifierSnapshot {
        ClassifierSnapshot {
            state: self.phase.state(),
            level: self.latch.level(),
            open_for: self.phase.open_since().map(|since| now.saturating_sub(since)),
            last_alert: self.last_alert,
        }
    }

    /// 清空状态与冷却计时
    pub fn reset(&mut self) {
        self.latch.reset();
        self.phase = Phase::Normal;
        self.last_alert = None;
    }
}
