use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::settings::UploaderConfig;

use super::auth::TokenProvider;
use super::queue::RetryQueue;
use super::transport::TelemetryTransport;
use super::types::{TelemetryEvent, TelemetryPayload};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Empty,
    Delivered(usize),
    /// The batch was put back at the front of the queue.
    Failed(usize),
    /// Cut off by shutdown before the server answered; the batch was put
    /// back at the front of the queue.
    Aborted(usize),
    /// Another flush was already in flight.
    Skipped,
    NoToken,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisposeReport {
    pub final_flush: FlushOutcome,
    /// Events still queued (or cut off in flight) when the uploader shut down.
    pub dropped: usize,
}

/// Fire-and-forget telemetry delivery with an in-memory retry queue.
///
/// Each recorded event is POSTed on its own first. Failures land in the retry
/// queue, which is sent to the batch endpoint on a timer, when it reaches
/// `max_queue`, and once more on [`dispose`](Self::dispose).
#[derive(Clone)]
pub struct TelemetryUploader {
    inner: Arc<UploaderInner>,
}

struct UploaderInner {
    config: UploaderConfig,
    enabled: AtomicBool,
    disposed: AtomicBool,
    flushing: AtomicBool,
    transport: Arc<dyn TelemetryTransport>,
    tokens: Arc<dyn TokenProvider>,
    queue: Mutex<RetryQueue>,
    metrics: MetricsCollector,
    tasks: TaskTracker,
    /// Cuts off in-flight single deliveries on dispose.
    abort_inflight: CancellationToken,
    stop_ticker: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryUploader {
    pub fn new(
        config: UploaderConfig,
        transport: Arc<dyn TelemetryTransport>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(UploaderInner {
                enabled: AtomicBool::new(config.enabled),
                config,
                disposed: AtomicBool::new(false),
                flushing: AtomicBool::new(false),
                transport,
                tokens,
                queue: Mutex::new(RetryQueue::new()),
                metrics: MetricsCollector::new(),
                tasks: TaskTracker::new(),
                abort_inflight: CancellationToken::new(),
                stop_ticker: CancellationToken::new(),
                ticker: Mutex::new(None),
            }),
        }
    }

    /// Arms the periodic flush timer. Calling it again is a no-op.
    pub async fn start(&self) {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return;
        }

        let mut ticker_guard = self.inner.ticker.lock().await;
        if ticker_guard.is_some() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let period = inner.config.flush_interval;
        let stop = inner.stop_ticker.clone();

        *ticker_guard = Some(tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = interval.tick() => {
                        let outcome = inner.flush_until(stop.cancelled()).await;
                        log_debug!("periodic telemetry flush: {:?}", outcome);
                    }
                }
            }
        }));
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Hand an event to the uploader. Never fails and never blocks; the
    /// delivery attempt runs on a tracked background task.
    pub fn record(&self, subject_id: i64, payload: impl Into<TelemetryPayload>) {
        if !self.is_enabled() || self.is_disposed() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log_error!("telemetry recorded outside a tokio runtime; event dropped");
            return;
        };

        let inner = Arc::clone(&self.inner);
        let Some(token) = inner.tokens.bearer_token() else {
            log_debug!("no session token; skipping telemetry for subject {}", subject_id);
            let metrics = inner.metrics.clone();
            self.inner
                .tasks
                .spawn_on(async move { metrics.record_skipped_without_token().await }, &runtime);
            return;
        };

        let event = TelemetryEvent::new(subject_id, payload);
        self.inner
            .tasks
            .spawn_on(async move { inner.deliver(token, event).await }, &runtime);
    }

    /// Send the whole retry queue to the batch endpoint now.
    pub async fn flush(&self) -> FlushOutcome {
        self.inner.flush_until(self.inner.abort_inflight.cancelled()).await
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.queue.lock().await.len()
    }

    pub async fn queued_events(&self) -> Vec<TelemetryEvent> {
        self.inner.queue.lock().await.iter().cloned().collect()
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.get_snapshot().await
    }

    /// Wait until every delivery task spawned so far has finished.
    pub async fn settle(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    /// Deterministic teardown: stop the timer, try one last flush bounded by
    /// the request timeout, cancel whatever is still in flight, and drop the
    /// rest.
    pub async fn dispose(&self) -> DisposeReport {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return DisposeReport {
                final_flush: FlushOutcome::Empty,
                dropped: 0,
            };
        }

        self.inner.stop_ticker.cancel();
        if let Some(handle) = self.inner.ticker.lock().await.take() {
            if let Err(err) = handle.await {
                log_warn!("telemetry flush timer ended abnormally: {err}");
            }
        }

        let grace = self.inner.config.request_timeout;
        let final_flush = self.inner.flush_until(time::sleep(grace)).await;

        self.inner.abort_inflight.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;

        let dropped = self.inner.queue.lock().await.clear();
        log_info!(
            "telemetry uploader disposed (final flush: {:?}, dropped {} events)",
            final_flush,
            dropped
        );

        DisposeReport {
            final_flush,
            dropped,
        }
    }
}

impl UploaderInner {
    async fn deliver(&self, token: String, event: TelemetryEvent) {
        let kind = event.kind();
        let result = tokio::select! {
            _ = self.abort_inflight.cancelled() => None,
            result = self.transport.send_single(&token, &event) => Some(result),
        };
        let Some(result) = result else {
            // Counted as dropped by dispose.
            self.queue.lock().await.push(event);
            return;
        };

        match result {
            Ok(()) => self.metrics.record_single(kind, None).await,
            Err(err) => {
                log_warn!(
                    "telemetry delivery failed for {} event on subject {}: {err}; queued for retry",
                    kind.as_str(),
                    event.subject_id
                );
                self.metrics.record_single(kind, Some(err.to_string())).await;

                let queued = self.queue.lock().await.push(event);
                if queued >= self.config.max_queue {
                    log_debug!("retry queue reached {} events; flushing early", queued);
                    self.flush_until(self.abort_inflight.cancelled()).await;
                }
            }
        }
    }

    /// Send the queue as one batch. If `cut_off` completes first the batch
    /// goes back to the front of the queue.
    async fn flush_until(&self, cut_off: impl Future<Output = ()>) -> FlushOutcome {
        if !self.enabled.load(Ordering::SeqCst) {
            return FlushOutcome::Disabled;
        }
        if self.flushing.swap(true, Ordering::SeqCst) {
            return FlushOutcome::Skipped;
        }
        let _guard = FlushGuard(&self.flushing);

        let Some(token) = self.tokens.bearer_token() else {
            return FlushOutcome::NoToken;
        };

        // Cleared before the request resolves; restored on failure.
        let batch = self.queue.lock().await.take_all();
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let count = batch.len();
        let result = tokio::select! {
            _ = cut_off => None,
            result = self.transport.send_batch(&token, &batch) => Some(result),
        };
        let Some(result) = result else {
            log_debug!("telemetry batch of {} cut off; requeued", count);
            self.queue.lock().await.restore_front(batch);
            return FlushOutcome::Aborted(count);
        };

        match result {
            Ok(()) => {
                log_info!("flushed {} queued telemetry events", count);
                self.metrics.record_batch(count, None).await;
                FlushOutcome::Delivered(count)
            }
            Err(err) => {
                log_warn!("telemetry batch of {} failed: {err}; requeued", count);
                self.metrics.record_batch(count, Some(err.to_string())).await;
                self.queue.lock().await.restore_front(batch);
                FlushOutcome::Failed(count)
            }
        }
    }
}

struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
