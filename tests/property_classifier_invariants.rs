use std::time::Duration;

use proptest::prelude::*;

use breath_monitor::detection::classifier::HysteresisLatch;
use breath_monitor::detection::{
    BreathingState, ClassifierConfig, ModeClassifier, MouthLevel, MovingAverage, Polarity,
};

fn config(sustained_ms: u64, cooldown_ms: u64) -> ClassifierConfig {
    ClassifierConfig {
        sustained_open: Duration::from_millis(sustained_ms),
        cooldown: Duration::from_millis(cooldown_ms),
        ..ClassifierConfig::default()
    }
}

proptest! {
    #[test]
    fn pt_below_high_threshold_never_alerts(
        samples in prop::collection::vec(0.0_f64..0.002, 1..300),
    ) {
        let mut classifier = ModeClassifier::new(ClassifierConfig::default());
        for (i, sample) in samples.into_iter().enumerate() {
            let outcome = classifier.update(sample, Duration::from_millis(100 * i as u64));
            prop_assert_eq!(outcome.state, BreathingState::Normal);
            prop_assert!(outcome.alert.is_none());
        }
    }

    #[test]
    fn pt_alerts_respect_cooldown(
        samples in prop::collection::vec(prop_oneof![Just(0.0_f64), Just(0.003), 0.0_f64..0.004], 1..600),
        sustained_ms in 0_u64..2_000,
        cooldown_ms in 0_u64..20_000,
    ) {
        let cooldown = Duration::from_millis(cooldown_ms);
        let mut classifier = ModeClassifier::new(config(sustained_ms, cooldown_ms));
        let mut last: Option<Duration> = None;

        for (i, sample) in samples.into_iter().enumerate() {
            let now = Duration::from_millis(100 * i as u64);
            if let Some(alert) = classifier.update(sample, now).alert {
                prop_assert_eq!(alert.at, now);
                prop_assert!(alert.open_for >= Duration::from_millis(sustained_ms));
                if let Some(prev) = last {
                    prop_assert!(alert.at - prev >= cooldown);
                }
                last = Some(alert.at);
            }
        }
    }

    #[test]
    fn pt_detected_only_after_candidate(
        samples in prop::collection::vec(0.0_f64..0.004, 1..400),
    ) {
        let mut classifier = ModeClassifier::new(config(500, 5_000));
        for (i, sample) in samples.into_iter().enumerate() {
            let outcome = classifier.update(sample, Duration::from_millis(100 * i as u64));
            if outcome.state == BreathingState::Detected {
                prop_assert_ne!(outcome.previous, BreathingState::Normal);
            }
            if outcome.alert.is_some() {
                prop_assert!(outcome.entered_detection());
            }
        }
    }

    #[test]
    fn pt_dead_zone_holds_previous_level(
        prefix in prop::collection::vec(0.0_f64..0.004, 0..50),
        dead in prop::collection::vec(0.001_f64..0.002, 1..50),
        polarity in prop_oneof![Just(Polarity::OpenAbove), Just(Polarity::OpenBelow)],
    ) {
        let mut latch = HysteresisLatch::new(0.002, 0.001, polarity);
        for sample in prefix {
            latch.feed(sample);
        }
        let before = latch.level();
        for sample in dead {
            // 0.001 与 0.002 端点本身属于越界，跳过
            if sample <= 0.001 || sample >= 0.002 {
                continue;
            }
            prop_assert_eq!(latch.feed(sample), before);
        }
    }

    #[test]
    fn pt_non_finite_samples_read_closed(
        bad in prop_oneof![Just(f64::NAN), Just(f64::INFINITY), Just(f64::NEG_INFINITY), -1.0_f64..-1e-9],
        polarity in prop_oneof![Just(Polarity::OpenAbove), Just(Polarity::OpenBelow)],
    ) {
        let mut latch = HysteresisLatch::new(0.002, 0.001, polarity);
        prop_assert_eq!(latch.feed(bad), MouthLevel::Closed);
    }

    #[test]
    fn pt_moving_average_stays_within_window_bounds(
        values in prop::collection::vec(0.0_f64..1.0, 1..100),
        size in 1_usize..30,
    ) {
        let mut avg = MovingAverage::new(size);
        for (i, v) in values.iter().enumerate() {
            let out = avg.update(*v);
            let start = (i + 1).saturating_sub(size);
            let window = &values[start..=i];
            let lo = window.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(out >= lo - 1e-12 && out <= hi + 1e-12);
        }
    }
}
