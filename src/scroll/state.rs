use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::time::Instant;

use crate::telemetry::ScrollReport;

pub const SPEED_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollPattern {
    #[default]
    SlowBrowse,
    Normal,
    FastScroll,
    Skip,
}

impl ScrollPattern {
    /// Bucket a mean speed in px/s.
    pub fn classify(mean_speed: f64) -> Self {
        if mean_speed < 100.0 {
            ScrollPattern::SlowBrowse
        } else if mean_speed < 300.0 {
            ScrollPattern::Normal
        } else if mean_speed < 600.0 {
            ScrollPattern::FastScroll
        } else {
            ScrollPattern::Skip
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMetrics {
    pub scroll_speed_px_per_sec: f64,
    pub pattern: ScrollPattern,
    pub pause_duration_ms: u64,
    pub engagement_score: f64,
    pub direction: ScrollDirection,
}

/// Slow reading plus a long pause scores highest; capped at 100.
pub fn engagement_score(mean_speed: f64, pause_duration_ms: u64) -> f64 {
    let speed_score = if mean_speed < 100.0 {
        0.8
    } else if mean_speed < 300.0 {
        0.5
    } else {
        0.2
    };
    let pause_score = (pause_duration_ms as f64 / 10_000.0).min(0.2);
    ((speed_score + pause_score) * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Default)]
pub struct ScrollState {
    last_scroll_y: Option<f64>,
    last_event_at: Option<Instant>,
    speeds: VecDeque<f64>,
    /// Set when a scroll burst ends; consumed by the next scroll event.
    pause_started_at: Option<Instant>,
    is_scrolling: bool,
    distance_since_report: f64,
    metrics: ScrollMetrics,
}

impl ScrollState {
    pub fn new() -> Self {
        Self {
            speeds: VecDeque::with_capacity(SPEED_WINDOW),
            ..Default::default()
        }
    }

    /// Feed one scroll position. Returns a report when this event ends a
    /// pause and the page moved more than `threshold_px` since the last one.
    pub fn on_scroll(&mut self, scroll_y: f64, now: Instant, threshold_px: f64) -> Option<ScrollReport> {
        if let (Some(last_y), Some(last_at)) = (self.last_scroll_y, self.last_event_at) {
            let delta_y = scroll_y - last_y;
            let delta_ms = now.saturating_duration_since(last_at).as_millis().max(1) as f64;
            let speed = delta_y.abs() / delta_ms * 1000.0;

            self.speeds.push_back(speed);
            while self.speeds.len() > SPEED_WINDOW {
                self.speeds.pop_front();
            }

            self.distance_since_report += delta_y.abs();
            self.metrics.scroll_speed_px_per_sec = speed;
            self.metrics.pattern = ScrollPattern::classify(self.mean_speed());
            if delta_y > 0.0 {
                self.metrics.direction = ScrollDirection::Down;
            } else if delta_y < 0.0 {
                self.metrics.direction = ScrollDirection::Up;
            }
        }

        let mut report = None;
        if let Some(pause_start) = self.pause_started_at.take() {
            let pause_ms = now.saturating_duration_since(pause_start).as_millis() as u64;
            let mean = self.mean_speed();
            self.metrics.pause_duration_ms = pause_ms;
            self.metrics.engagement_score = engagement_score(mean, pause_ms);

            if self.distance_since_report > threshold_px {
                report = Some(ScrollReport {
                    scroll_speed: mean,
                    scroll_pattern: self.metrics.pattern,
                    pause_duration: pause_ms,
                    engagement_score: self.metrics.engagement_score,
                    swipe_direction: self.metrics.direction,
                });
                self.distance_since_report = 0.0;
            }
        }

        self.is_scrolling = true;
        self.last_scroll_y = Some(scroll_y);
        self.last_event_at = Some(now);
        report
    }

    /// Debounce expiry: the burst is over and a pause begins.
    pub fn on_scroll_end(&mut self, now: Instant) {
        self.is_scrolling = false;
        self.pause_started_at = Some(now);
    }

    pub fn mean_speed(&self) -> f64 {
        if self.speeds.is_empty() {
            return 0.0;
        }
        self.speeds.iter().sum::<f64>() / self.speeds.len() as f64
    }

    pub fn window_len(&self) -> usize {
        self.speeds.len()
    }

    pub fn is_scrolling(&self) -> bool {
        self.is_scrolling
    }

    pub fn metrics(&self) -> ScrollMetrics {
        self.metrics
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn classification_boundaries() {
        assert_eq!(ScrollPattern::classify(99.0), ScrollPattern::SlowBrowse);
        assert_eq!(ScrollPattern::classify(100.0), ScrollPattern::Normal);
        assert_eq!(ScrollPattern::classify(299.0), ScrollPattern::Normal);
        assert_eq!(ScrollPattern::classify(300.0), ScrollPattern::FastScroll);
        assert_eq!(ScrollPattern::classify(599.0), ScrollPattern::FastScroll);
        assert_eq!(ScrollPattern::classify(600.0), ScrollPattern::Skip);
    }

    #[test]
    fn engagement_combines_speed_and_pause() {
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        assert!(close(engagement_score(50.0, 0), 80.0));
        assert!(close(engagement_score(50.0, 1_000), 90.0));
        assert!(close(engagement_score(50.0, 60_000), 100.0));
        assert!(close(engagement_score(200.0, 0), 50.0));
        assert!(close(engagement_score(900.0, 5_000), 40.0));
    }

    #[test]
    fn speed_and_direction_from_deltas() {
        let mut state = ScrollState::new();
        let t0 = Instant::now();

        state.on_scroll(0.0, t0, 50.0);
        state.on_scroll(200.0, t0 + Duration::from_millis(500), 50.0);
        let metrics = state.metrics();
        assert_eq!(metrics.scroll_speed_px_per_sec, 400.0);
        assert_eq!(metrics.pattern, ScrollPattern::FastScroll);
        assert_eq!(metrics.direction, ScrollDirection::Down);

        state.on_scroll(100.0, t0 + Duration::from_millis(1_500), 50.0);
        assert_eq!(state.metrics().direction, ScrollDirection::Up);
        assert_eq!(state.mean_speed(), 250.0);
    }

    #[test]
    fn window_keeps_latest_speeds() {
        let mut state = ScrollState::new();
        let t0 = Instant::now();
        for i in 0..25u64 {
            state.on_scroll(i as f64 * 10.0, t0 + Duration::from_millis(i * 100), 50.0);
        }
        assert_eq!(state.window_len(), SPEED_WINDOW);
    }

    #[test]
    fn report_after_pause_when_over_threshold() {
        let mut state = ScrollState::new();
        let t0 = Instant::now();

        assert!(state.on_scroll(0.0, t0, 50.0).is_none());
        assert!(state.on_scroll(40.0, t0 + Duration::from_millis(100), 50.0).is_none());
        state.on_scroll_end(t0 + Duration::from_millis(250));
        assert!(!state.is_scrolling());

        let report = state
            .on_scroll(80.0, t0 + Duration::from_millis(2_250), 50.0)
            .unwrap();
        assert_eq!(report.pause_duration, 2_000);
        assert_eq!(report.swipe_direction, ScrollDirection::Down);
        assert!(state.is_scrolling());

        // Distance resets after a report.
        state.on_scroll_end(t0 + Duration::from_millis(2_400));
        assert!(state.on_scroll(90.0, t0 + Duration::from_millis(3_000), 50.0).is_none());
    }

    #[test]
    fn short_scroll_after_pause_updates_metrics_only() {
        let mut state = ScrollState::new();
        let t0 = Instant::now();

        state.on_scroll(0.0, t0, 50.0);
        state.on_scroll_end(t0 + Duration::from_millis(150));
        let report = state.on_scroll(30.0, t0 + Duration::from_millis(3_150), 50.0);

        assert!(report.is_none());
        assert_eq!(state.metrics().pause_duration_ms, 3_000);
        assert!(state.metrics().engagement_score > 0.0);
    }

    #[test]
    fn same_instant_events_do_not_divide_by_zero() {
        let mut state = ScrollState::new();
        let t0 = Instant::now();
        state.on_scroll(0.0, t0, 50.0);
        state.on_scroll(10.0, t0, 50.0);
        assert!(state.metrics().scroll_speed_px_per_sec.is_finite());
    }

    proptest! {
        #[test]
        fn scores_stay_in_range(steps in proptest::collection::vec((-2_000.0f64..2_000.0, 0u64..5_000, any::<bool>()), 1..80)) {
            let mut state = ScrollState::new();
            let mut now = Instant::now();
            let mut y = 0.0;
            for (delta, gap_ms, ends) in steps {
                now += Duration::from_millis(gap_ms);
                y += delta;
                state.on_scroll(y, now, 50.0);
                if ends {
                    state.on_scroll_end(now + Duration::from_millis(150));
                }
                let metrics = state.metrics();
                prop_assert!(metrics.scroll_speed_px_per_sec >= 0.0);
                prop_assert!((0.0..=100.0).contains(&metrics.engagement_score));
                prop_assert!(state.window_len() <= SPEED_WINDOW);
            }
        }

        #[test]
        fn classification_is_monotonic(a in 0.0f64..2_000.0, b in 0.0f64..2_000.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(ScrollPattern::classify(lo) as u8 <= ScrollPattern::classify(hi) as u8);
        }
    }
}
