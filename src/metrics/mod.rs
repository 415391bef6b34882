mod types;

pub use types::{DeliveryChannel, DeliveryRecord, MetricsSnapshot};

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::telemetry::TelemetryKind;

const MAX_RECENT_DELIVERIES: usize = 20;

/// Delivery counters for the uploader, plus a short history of outcomes.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

#[derive(Default)]
struct MetricsState {
    recent_deliveries: Vec<DeliveryRecord>,
    delivered_count: u64,
    failed_count: u64,
    skipped_without_token: u64,
    batch_flush_count: u64,
    batch_failure_count: u64,
    batched_event_count: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_single(&self, kind: TelemetryKind, error: Option<String>) {
        let mut state = self.inner.lock().await;
        if error.is_some() {
            state.failed_count += 1;
        } else {
            state.delivered_count += 1;
        }
        state.push(DeliveryRecord {
            timestamp: Utc::now(),
            channel: DeliveryChannel::Single,
            kind: Some(kind),
            events: 1,
            succeeded: error.is_none(),
            error,
        });
    }

    pub async fn record_batch(&self, events: usize, error: Option<String>) {
        let mut state = self.inner.lock().await;
        state.batch_flush_count += 1;
        if error.is_some() {
            state.batch_failure_count += 1;
        } else {
            state.batched_event_count += events as u64;
            state.delivered_count += events as u64;
        }
        state.push(DeliveryRecord {
            timestamp: Utc::now(),
            channel: DeliveryChannel::Batch,
            kind: None,
            events,
            succeeded: error.is_none(),
            error,
        });
    }

    pub async fn record_skipped_without_token(&self) {
        self.inner.lock().await.skipped_without_token += 1;
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let state = self.inner.lock().await;
        MetricsSnapshot {
            recent_deliveries: state.recent_deliveries.clone(),
            delivered_count: state.delivered_count,
            failed_count: state.failed_count,
            skipped_without_token: state.skipped_without_token,
            batch_flush_count: state.batch_flush_count,
            batch_failure_count: state.batch_failure_count,
            batched_event_count: state.batched_event_count,
        }
    }

    pub async fn reset(&self) {
        *self.inner.lock().await = MetricsState::default();
    }
}

impl MetricsState {
    fn push(&mut self, record: DeliveryRecord) {
        self.recent_deliveries.push(record);
        if self.recent_deliveries.len() > MAX_RECENT_DELIVERIES {
            self.recent_deliveries.remove(0);
        }
    }
}
