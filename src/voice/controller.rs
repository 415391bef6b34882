use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::telemetry::{TelemetryUploader, VoiceReport};

use super::analysis::{VoiceDetector, VoiceInteraction, VoiceMetrics};
use super::backend::{release_capture, AudioBackend, AudioCapture};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// One analyser read per display frame.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);
pub const VOICE_INTERACTION_TYPE: &str = "voice_activity";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Unknown,
    Granted,
    Denied,
}

struct VoiceSession {
    capture: Arc<Mutex<Box<dyn AudioCapture>>>,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Microphone voice-activity tracking.
#[derive(Clone)]
pub struct VoiceTracker {
    uploader: TelemetryUploader,
    backend: Arc<dyn AudioBackend>,
    permission: Arc<Mutex<PermissionState>>,
    enabled: Arc<AtomicBool>,
    subject_id: Arc<Mutex<Option<i64>>>,
    detector: Arc<Mutex<VoiceDetector>>,
    session: Arc<Mutex<Option<VoiceSession>>>,
    last_error: Arc<std::sync::Mutex<Option<String>>>,
    metrics_tx: Arc<watch::Sender<VoiceMetrics>>,
}

impl VoiceTracker {
    pub fn new(uploader: TelemetryUploader, backend: Arc<dyn AudioBackend>) -> Self {
        let (metrics_tx, _) = watch::channel(VoiceMetrics::default());
        Self {
            uploader,
            backend,
            permission: Arc::new(Mutex::new(PermissionState::Unknown)),
            enabled: Arc::new(AtomicBool::new(false)),
            subject_id: Arc::new(Mutex::new(None)),
            detector: Arc::new(Mutex::new(VoiceDetector::default())),
            session: Arc::new(Mutex::new(None)),
            last_error: Arc::new(std::sync::Mutex::new(None)),
            metrics_tx: Arc::new(metrics_tx),
        }
    }

    /// Ask for microphone access once. A denial sticks for the session and
    /// is not re-prompted automatically.
    pub async fn request_permission(&self) -> bool {
        let mut permission = self.permission.lock().await;
        match *permission {
            PermissionState::Granted => true,
            PermissionState::Denied => false,
            PermissionState::Unknown => {
                let granted = self.backend.request_permission();
                *permission = if granted {
                    PermissionState::Granted
                } else {
                    PermissionState::Denied
                };
                log_info!("microphone permission {}", if granted { "granted" } else { "denied" });
                granted
            }
        }
    }

    pub async fn permission(&self) -> PermissionState {
        *self.permission.lock().await
    }

    pub async fn permission_denied(&self) -> bool {
        self.permission().await == PermissionState::Denied
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn metrics(&self) -> VoiceMetrics {
        *self.metrics_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<VoiceMetrics> {
        self.metrics_tx.subscribe()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub async fn is_tracking(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub async fn focus_subject(&self, subject_id: i64) {
        *self.subject_id.lock().await = Some(subject_id);
    }

    pub async fn set_sensitivity(&self, sensitivity: u8) {
        self.detector.lock().await.set_sensitivity(sensitivity);
    }

    /// Start or stop tracking. Starting acquires a fresh microphone stream
    /// and only happens once permission is granted.
    pub async fn toggle_tracking(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.stop_tracking().await;
            return;
        }

        if !self.request_permission().await {
            return;
        }

        let mut session = self.session.lock().await;
        if session.is_some() {
            return;
        }

        let capture = match self.backend.open() {
            Ok(capture) => capture,
            Err(err) => {
                log_error!("failed to open microphone stream: {err:#}");
                self.set_error(format!("{err:#}"));
                return;
            }
        };
        self.clear_error();

        let capture = Arc::new(Mutex::new(capture));
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(frame_loop(
            self.clone(),
            Arc::clone(&capture),
            cancel_token.clone(),
            Instant::now(),
        ));

        *session = Some(VoiceSession {
            capture,
            cancel_token,
            handle,
        });
        log_info!("voice tracking started");
    }

    /// Release the microphone: stop the frame loop, close the context,
    /// disconnect the source and stop the tracks, in that order, attempting
    /// every step. Does nothing when already stopped.
    pub async fn stop_tracking(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };

        session.cancel_token.cancel();
        if let Err(err) = session.handle.await {
            log_warn!("voice frame loop ended abnormally: {err}");
        }

        let failures = {
            let mut capture = session.capture.lock().await;
            release_capture(capture.as_mut())
        };
        for (step, err) in &failures {
            log_error!("microphone teardown step {:?} failed: {err:#}", step);
        }
        if let Some((step, err)) = failures.last() {
            self.set_error(format!("{:?}: {err:#}", step));
        }

        self.detector.lock().await.reset();
        self.metrics_tx.send_replace(VoiceMetrics::default());
        log_info!("voice tracking stopped");
    }

    async fn report(&self, interaction: VoiceInteraction, session_started: Instant) {
        let Some(subject_id) = *self.subject_id.lock().await else {
            return;
        };
        let offset = interaction
            .started_at
            .saturating_duration_since(session_started)
            .as_secs_f64();

        self.uploader.record(
            subject_id,
            VoiceReport {
                interaction_type: VOICE_INTERACTION_TYPE.to_string(),
                duration: interaction.duration_ms,
                intensity: interaction.peak_intensity,
                timestamp_in_video: offset,
            },
        );
    }

    fn set_error(&self, message: String) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(message);
    }

    fn clear_error(&self) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

async fn frame_loop(
    tracker: VoiceTracker,
    capture: Arc<Mutex<Box<dyn AudioCapture>>>,
    cancel_token: CancellationToken,
    session_started: Instant,
) {
    let mut bins = vec![0u8; capture.lock().await.frequency_bin_count()];
    let mut ticker = time::interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                capture.lock().await.fill_frequency_data(&mut bins);
                let (interaction, metrics) = {
                    let mut detector = tracker.detector.lock().await;
                    (detector.process_frame(&bins, Instant::now()), detector.metrics())
                };
                tracker.metrics_tx.send_replace(metrics);

                if let Some(interaction) = interaction {
                    tracker.report(interaction, session_started).await;
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }
}
