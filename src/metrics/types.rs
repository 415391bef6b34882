use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::TelemetryKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryChannel {
    Single,
    Batch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub timestamp: DateTime<Utc>,
    pub channel: DeliveryChannel,
    /// Set for single deliveries only.
    pub kind: Option<TelemetryKind>,
    pub events: usize,
    pub succeeded: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub recent_deliveries: Vec<DeliveryRecord>,
    pub delivered_count: u64,
    pub failed_count: u64,
    pub skipped_without_token: u64,
    pub batch_flush_count: u64,
    pub batch_failure_count: u64,
    pub batched_event_count: u64,
}
