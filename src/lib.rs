pub mod gaze;
pub mod metrics;
pub mod scroll;
pub mod settings;
pub mod telemetry;
pub mod utils;
pub mod voice;

use anyhow::Result;
use std::sync::Arc;

pub use gaze::{GazeTracker, Rect, SharedTarget, TargetElement, Viewport};
pub use scroll::ScrollTracker;
pub use settings::{SettingsStore, TrackingSettings, UploaderConfig};
pub use telemetry::{
    DisposeReport, FlushOutcome, HttpTransport, SharedToken, TelemetryTransport, TelemetryUploader,
    TokenProvider,
};
pub use utils::init_logging;
pub use voice::{AudioBackend, FeedBackend, VoiceTracker};

const ENABLE_LOGS: bool = true;

/// The three samplers wired to one uploader and driven by stored settings.
pub struct TrackingRuntime {
    settings: SettingsStore,
    uploader: TelemetryUploader,
    gaze: GazeTracker,
    scroll: ScrollTracker,
    voice: VoiceTracker,
}

impl TrackingRuntime {
    pub fn new(
        settings: SettingsStore,
        uploader: TelemetryUploader,
        audio: Arc<dyn AudioBackend>,
    ) -> Self {
        Self {
            gaze: GazeTracker::new(uploader.clone()),
            scroll: ScrollTracker::new(uploader.clone()),
            voice: VoiceTracker::new(uploader.clone(), audio),
            settings,
            uploader,
        }
    }

    /// Arm the flush timer and bring the samplers in line with the stored
    /// settings.
    pub async fn start(&self) {
        self.uploader.start().await;
        self.configure(self.settings.tracking()).await;
        log_info!("tracking runtime started");
    }

    /// Persist `settings` and apply them to every sampler. Returns the
    /// normalized settings that were stored.
    pub async fn apply_settings(&self, settings: TrackingSettings) -> Result<TrackingSettings> {
        let stored = self.settings.update_tracking(settings)?;
        self.configure(stored.clone()).await;
        Ok(stored)
    }

    pub fn tracking_settings(&self) -> TrackingSettings {
        self.settings.tracking()
    }

    /// The video now on screen. Scroll and voice reports go to it.
    pub async fn focus_subject(&self, subject_id: i64) {
        self.scroll.focus_subject(subject_id).await;
        self.voice.focus_subject(subject_id).await;
    }

    pub fn uploader(&self) -> &TelemetryUploader {
        &self.uploader
    }

    pub fn gaze(&self) -> &GazeTracker {
        &self.gaze
    }

    pub fn scroll(&self) -> &ScrollTracker {
        &self.scroll
    }

    pub fn voice(&self) -> &VoiceTracker {
        &self.voice
    }

    /// Stop every sampler (sending their final reports), then dispose the
    /// uploader.
    pub async fn shutdown(&self) -> DisposeReport {
        self.gaze.stop_tracking().await;
        self.scroll.stop().await;
        self.voice.stop_tracking().await;

        let report = self.uploader.dispose().await;
        log_info!("tracking runtime shut down ({} events dropped)", report.dropped);
        report
    }

    async fn configure(&self, settings: TrackingSettings) {
        self.gaze.set_enabled(settings.eye_tracking_enabled).await;
        self.scroll
            .observe(settings.scroll_tracking_enabled, settings.scroll_threshold_px)
            .await;
        self.voice.set_sensitivity(settings.voice_sensitivity).await;
        self.voice
            .toggle_tracking(settings.voice_tracking_enabled)
            .await;
    }
}
