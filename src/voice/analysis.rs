use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

use crate::settings::DEFAULT_VOICE_SENSITIVITY;

/// Activity shorter than this is treated as noise.
pub const MIN_INTERACTION: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceMetrics {
    pub is_active: bool,
    pub intensity: f64,
    pub duration_ms: u64,
    pub interaction_count: u32,
}

/// One completed stretch of voice activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceInteraction {
    pub started_at: Instant,
    pub duration_ms: u64,
    pub peak_intensity: f64,
    pub ending_intensity: f64,
}

/// Mean of byte-frequency bins scaled to 0-100.
pub fn intensity(bins: &[u8]) -> f64 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&bin| bin as u64).sum();
    let mean = sum as f64 / bins.len() as f64;
    (mean / 255.0 * 100.0).clamp(0.0, 100.0)
}

/// Loudness above which a frame counts as voice.
pub fn threshold_for(sensitivity: u8) -> f64 {
    (100 - sensitivity.min(100)) as f64 / 2.0
}

/// Edge detector over per-frame loudness.
#[derive(Debug)]
pub struct VoiceDetector {
    sensitivity: u8,
    started_at: Option<Instant>,
    peak_intensity: f64,
    metrics: VoiceMetrics,
}

impl Default for VoiceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_VOICE_SENSITIVITY)
    }
}

impl VoiceDetector {
    pub fn new(sensitivity: u8) -> Self {
        Self {
            sensitivity: sensitivity.min(100),
            started_at: None,
            peak_intensity: 0.0,
            metrics: VoiceMetrics::default(),
        }
    }

    pub fn sensitivity(&self) -> u8 {
        self.sensitivity
    }

    pub fn set_sensitivity(&mut self, sensitivity: u8) {
        self.sensitivity = sensitivity.min(100);
    }

    pub fn threshold(&self) -> f64 {
        threshold_for(self.sensitivity)
    }

    /// Process one analyser frame. Returns the finished interaction on a
    /// falling edge, if it lasted at least [`MIN_INTERACTION`].
    pub fn process_frame(&mut self, bins: &[u8], now: Instant) -> Option<VoiceInteraction> {
        let level = intensity(bins);
        let active = level > self.threshold();
        self.metrics.intensity = level;

        match (self.started_at, active) {
            (None, true) => {
                self.started_at = Some(now);
                self.peak_intensity = level;
                self.metrics.is_active = true;
                self.metrics.duration_ms = 0;
                self.metrics.interaction_count = self.metrics.interaction_count.saturating_add(1);
                None
            }
            (Some(started_at), true) => {
                self.peak_intensity = self.peak_intensity.max(level);
                self.metrics.duration_ms = elapsed_ms(started_at, now);
                None
            }
            (Some(started_at), false) => {
                let duration_ms = elapsed_ms(started_at, now);
                self.started_at = None;
                self.metrics.is_active = false;
                self.metrics.duration_ms = duration_ms;

                let peak = std::mem::take(&mut self.peak_intensity);
                (duration_ms >= MIN_INTERACTION.as_millis() as u64).then_some(VoiceInteraction {
                    started_at,
                    duration_ms,
                    peak_intensity: peak,
                    ending_intensity: level,
                })
            }
            (None, false) => None,
        }
    }

    pub fn metrics(&self) -> VoiceMetrics {
        self.metrics
    }

    /// Back to silence with a zero interaction count.
    pub fn reset(&mut self) {
        self.started_at = None;
        self.peak_intensity = 0.0;
        self.metrics = VoiceMetrics::default();
    }
}

fn elapsed_ms(from: Instant, to: Instant) -> u64 {
    to.saturating_duration_since(from).as_millis() as u64
}
