use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Duration, Instant},
};

use crate::settings::DEFAULT_SCROLL_THRESHOLD_PX;
use crate::telemetry::TelemetryUploader;

use super::state::{ScrollMetrics, ScrollState};

const ENABLE_LOGS: bool = false;

use crate::log_debug;

/// Quiet time after the last scroll event before the burst counts as over.
pub const SCROLL_END_DEBOUNCE: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy)]
struct ScrollConfig {
    enabled: bool,
    threshold_px: f64,
}

/// Turns raw scroll positions into engagement metrics and reports.
#[derive(Clone)]
pub struct ScrollTracker {
    uploader: TelemetryUploader,
    config: Arc<Mutex<ScrollConfig>>,
    subject_id: Arc<Mutex<Option<i64>>>,
    state: Arc<Mutex<ScrollState>>,
    debounce: Arc<Mutex<Option<JoinHandle<()>>>>,
    is_scrolling: Arc<AtomicBool>,
    metrics_tx: Arc<watch::Sender<ScrollMetrics>>,
}

impl ScrollTracker {
    pub fn new(uploader: TelemetryUploader) -> Self {
        let (metrics_tx, _) = watch::channel(ScrollMetrics::default());
        Self {
            uploader,
            config: Arc::new(Mutex::new(ScrollConfig {
                enabled: false,
                threshold_px: DEFAULT_SCROLL_THRESHOLD_PX,
            })),
            subject_id: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(ScrollState::new())),
            debounce: Arc::new(Mutex::new(None)),
            is_scrolling: Arc::new(AtomicBool::new(false)),
            metrics_tx: Arc::new(metrics_tx),
        }
    }

    /// Turn observation on or off and set the reporting distance.
    pub async fn observe(&self, enabled: bool, threshold_px: f64) {
        {
            let mut config = self.config.lock().await;
            config.enabled = enabled;
            if threshold_px.is_finite() && threshold_px >= 0.0 {
                config.threshold_px = threshold_px;
            }
        }
        if !enabled {
            self.stop().await;
        }
    }

    /// Reports are attributed to this subject until it changes.
    pub async fn focus_subject(&self, subject_id: i64) {
        *self.subject_id.lock().await = Some(subject_id);
    }

    pub fn is_scrolling(&self) -> bool {
        self.is_scrolling.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> ScrollMetrics {
        *self.metrics_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScrollMetrics> {
        self.metrics_tx.subscribe()
    }

    pub async fn on_scroll(&self, scroll_y: f64) {
        let config = *self.config.lock().await;
        if !config.enabled {
            return;
        }

        let (report, metrics) = {
            let mut state = self.state.lock().await;
            let report = state.on_scroll(scroll_y, Instant::now(), config.threshold_px);
            (report, state.metrics())
        };
        self.is_scrolling.store(true, Ordering::SeqCst);
        self.metrics_tx.send_replace(metrics);
        self.rearm_debounce().await;

        if let Some(report) = report {
            match *self.subject_id.lock().await {
                Some(subject_id) => self.uploader.record(subject_id, report),
                None => log_debug!("scroll report dropped: no subject in focus"),
            }
        }
    }

    /// Drop pending debounce work and forget all scroll history.
    pub async fn stop(&self) {
        if let Some(handle) = self.debounce.lock().await.take() {
            handle.abort();
        }
        self.state.lock().await.reset();
        self.is_scrolling.store(false, Ordering::SeqCst);
        self.metrics_tx.send_replace(ScrollMetrics::default());
    }

    async fn rearm_debounce(&self) {
        let mut debounce = self.debounce.lock().await;
        if let Some(handle) = debounce.take() {
            handle.abort();
        }

        let state = Arc::clone(&self.state);
        let is_scrolling = Arc::clone(&self.is_scrolling);
        *debounce = Some(tokio::spawn(async move {
            time::sleep(SCROLL_END_DEBOUNCE).await;
            state.lock().await.on_scroll_end(Instant::now());
            is_scrolling.store(false, Ordering::SeqCst);
        }));
    }
}
