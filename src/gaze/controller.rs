use chrono::Utc;
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

use crate::telemetry::TelemetryUploader;

use super::state::{GazeMetrics, GazeSample, GazeState};
use super::target::TargetElement;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const GAZE_REPORT_INTERVAL: Duration = Duration::from_secs(5);

struct GazeSession {
    subject_id: i64,
    target: Arc<dyn TargetElement>,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Samples pointer moves over a target element and reports attention.
#[derive(Clone)]
pub struct GazeTracker {
    uploader: TelemetryUploader,
    enabled: Arc<AtomicBool>,
    permitted: Arc<AtomicBool>,
    state: Arc<Mutex<GazeState>>,
    session: Arc<Mutex<Option<GazeSession>>>,
    metrics_tx: Arc<watch::Sender<GazeMetrics>>,
}

impl GazeTracker {
    pub fn new(uploader: TelemetryUploader) -> Self {
        let (metrics_tx, _) = watch::channel(GazeMetrics::default());
        Self {
            uploader,
            enabled: Arc::new(AtomicBool::new(false)),
            permitted: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(GazeState::new())),
            session: Arc::new(Mutex::new(None)),
            metrics_tx: Arc::new(metrics_tx),
        }
    }

    /// Pointer sampling needs no OS grant, so this always succeeds.
    pub fn request_permission(&self) -> bool {
        self.permitted.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub async fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.stop_tracking().await;
        }
    }

    pub async fn is_tracking(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub fn metrics(&self) -> GazeMetrics {
        *self.metrics_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<GazeMetrics> {
        self.metrics_tx.subscribe()
    }

    /// Begin sampling against `target` for `subject_id`. Returns `false` and
    /// stays idle when tracking is disabled or not permitted. A session that
    /// is already running is stopped (and reported) first.
    pub async fn start_tracking(&self, target: Arc<dyn TargetElement>, subject_id: i64) -> bool {
        if !self.is_enabled() {
            return false;
        }
        if !self.permitted.load(Ordering::SeqCst) && !self.request_permission() {
            return false;
        }

        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            self.finish_session(previous).await;
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(report_loop(
            Arc::clone(&self.state),
            Arc::clone(&target),
            self.uploader.clone(),
            subject_id,
            cancel_token.clone(),
        ));

        *session = Some(GazeSession {
            subject_id,
            target,
            cancel_token,
            handle,
        });
        log_info!("gaze tracking started for subject {}", subject_id);
        true
    }

    pub async fn on_pointer_move(&self, x: f64, y: f64) {
        let session = self.session.lock().await;
        let Some(session) = session.as_ref() else {
            return;
        };
        let Some(rect) = session.target.bounding_rect() else {
            return;
        };

        let sample = GazeSample {
            x,
            y,
            timestamp_ms: Utc::now().timestamp_millis(),
        };
        let metrics = self
            .state
            .lock()
            .await
            .record_sample(sample, rect, Instant::now());
        self.metrics_tx.send_replace(metrics);
    }

    /// Stop sampling, send whatever is buffered, and clear local state.
    /// A second call finds no session and does nothing.
    pub async fn stop_tracking(&self) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };
        self.finish_session(session).await;
    }

    async fn finish_session(&self, session: GazeSession) {
        session.cancel_token.cancel();
        if let Err(err) = session.handle.await {
            log_warn!("gaze report loop ended abnormally: {err}");
        }

        let mut state = self.state.lock().await;
        if let Some(report) = state.report(session.target.bounding_rect(), session.target.viewport()) {
            self.uploader.record(session.subject_id, report);
        }
        state.reset();
        self.metrics_tx.send_replace(GazeMetrics::default());
        log_info!("gaze tracking stopped for subject {}", session.subject_id);
    }
}

async fn report_loop(
    state: Arc<Mutex<GazeState>>,
    target: Arc<dyn TargetElement>,
    uploader: TelemetryUploader,
    subject_id: i64,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval(GAZE_REPORT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = state
                    .lock()
                    .await
                    .report(target.bounding_rect(), target.viewport());
                if let Some(report) = report {
                    uploader.record(subject_id, report);
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }
}
