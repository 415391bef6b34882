use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::time::Instant;

use crate::telemetry::{GazeReport, ViewportData};

pub const GAZE_BUFFER_CAPACITY: usize = 100;
/// Points included in one report, newest last.
pub const REPORT_SLICE_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Edges count as inside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GazeMetrics {
    pub attention_score: f64,
    pub focus_duration_ms: u64,
    pub is_looking_at_target: bool,
}

/// Pointer samples and the attention metrics derived from them.
#[derive(Debug, Default)]
pub struct GazeState {
    samples: VecDeque<GazeSample>,
    metrics: GazeMetrics,
    /// Focus time from intervals that already ended; combines with
    /// `focus_anchor` while the pointer is inside the target.
    focus_baseline_ms: u64,
    focus_anchor: Option<Instant>,
}

impl GazeState {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(GAZE_BUFFER_CAPACITY),
            ..Default::default()
        }
    }

    pub fn record_sample(&mut self, sample: GazeSample, target: Rect, now: Instant) -> GazeMetrics {
        self.samples.push_back(sample);
        while self.samples.len() > GAZE_BUFFER_CAPACITY {
            self.samples.pop_front();
        }

        let inside = target.contains(sample.x, sample.y);
        match (self.focus_anchor, inside) {
            (None, true) => self.focus_anchor = Some(now),
            (Some(anchor), false) => {
                self.focus_baseline_ms = self
                    .focus_baseline_ms
                    .saturating_add(elapsed_ms(anchor, now));
                self.focus_anchor = None;
            }
            _ => {}
        }

        self.metrics = GazeMetrics {
            attention_score: self.attention_score(target),
            focus_duration_ms: self.focus_duration_ms(now),
            is_looking_at_target: inside,
        };
        self.metrics
    }

    /// Share of buffered points inside `target`, as a percentage.
    pub fn attention_score(&self, target: Rect) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let inside = self
            .samples
            .iter()
            .filter(|sample| target.contains(sample.x, sample.y))
            .count();
        (inside as f64 / self.samples.len() as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn focus_duration_ms(&self, now: Instant) -> u64 {
        match self.focus_anchor {
            Some(anchor) => self.focus_baseline_ms.saturating_add(elapsed_ms(anchor, now)),
            None => self.focus_baseline_ms,
        }
    }

    pub fn metrics(&self) -> GazeMetrics {
        self.metrics
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &GazeSample> {
        self.samples.iter()
    }

    /// Latest slice of samples plus current metrics, or `None` when nothing
    /// has been buffered.
    pub fn report(&self, target: Option<Rect>, viewport: Viewport) -> Option<GazeReport> {
        if self.samples.is_empty() {
            return None;
        }

        let skip = self.samples.len().saturating_sub(REPORT_SLICE_LEN);
        Some(GazeReport {
            gaze_points: self.samples.iter().skip(skip).copied().collect(),
            attention_score: self.metrics.attention_score,
            focus_duration: self.metrics.focus_duration_ms,
            viewport_data: ViewportData {
                width: viewport.width,
                height: viewport.height,
                target_rect: target,
            },
        })
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.metrics = GazeMetrics::default();
        self.focus_baseline_ms = 0;
        self.focus_anchor = None;
    }
}

fn elapsed_ms(from: Instant, to: Instant) -> u64 {
    to.saturating_duration_since(from).as_millis() as u64
}
