use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gaze::{GazeSample, Rect};
use crate::scroll::{ScrollDirection, ScrollPattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TelemetryKind {
    #[serde(rename = "eye")]
    Gaze,
    #[serde(rename = "scroll")]
    Scroll,
    #[serde(rename = "voice")]
    Voice,
}

impl TelemetryKind {
    /// Path segment under `/ai/track/`, also used as the batch `type` tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryKind::Gaze => "eye",
            TelemetryKind::Scroll => "scroll",
            TelemetryKind::Voice => "voice",
        }
    }

    pub fn endpoint(&self) -> String {
        format!("/ai/track/{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportData {
    pub width: f64,
    pub height: f64,
    pub target_rect: Option<Rect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GazeReport {
    pub gaze_points: Vec<GazeSample>,
    pub attention_score: f64,
    /// Milliseconds.
    pub focus_duration: u64,
    pub viewport_data: ViewportData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollReport {
    /// Windowed mean, px/s.
    pub scroll_speed: f64,
    pub scroll_pattern: ScrollPattern,
    pub pause_duration: u64,
    pub engagement_score: f64,
    pub swipe_direction: ScrollDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceReport {
    pub interaction_type: String,
    pub duration: u64,
    pub intensity: f64,
    /// Seconds since voice tracking started.
    pub timestamp_in_video: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TelemetryPayload {
    Gaze(GazeReport),
    Scroll(ScrollReport),
    Voice(VoiceReport),
}

impl TelemetryPayload {
    pub fn kind(&self) -> TelemetryKind {
        match self {
            TelemetryPayload::Gaze(_) => TelemetryKind::Gaze,
            TelemetryPayload::Scroll(_) => TelemetryKind::Scroll,
            TelemetryPayload::Voice(_) => TelemetryKind::Voice,
        }
    }
}

impl From<GazeReport> for TelemetryPayload {
    fn from(report: GazeReport) -> Self {
        TelemetryPayload::Gaze(report)
    }
}

impl From<ScrollReport> for TelemetryPayload {
    fn from(report: ScrollReport) -> Self {
        TelemetryPayload::Scroll(report)
    }
}

impl From<VoiceReport> for TelemetryPayload {
    fn from(report: VoiceReport) -> Self {
        TelemetryPayload::Voice(report)
    }
}

/// One finished sampler record on its way to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub id: Uuid,
    pub subject_id: i64,
    pub payload: TelemetryPayload,
    pub created_at: DateTime<Utc>,
}

impl TelemetryEvent {
    pub fn new(subject_id: i64, payload: impl Into<TelemetryPayload>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id,
            payload: payload.into(),
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> TelemetryKind {
        self.payload.kind()
    }

    pub fn single_body(&self) -> SingleBody<'_> {
        SingleBody {
            video_id: self.subject_id,
            payload: &self.payload,
        }
    }
}

/// Body for the per-kind endpoints: the report fields plus `videoId`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleBody<'a> {
    pub video_id: i64,
    #[serde(flatten)]
    pub payload: &'a TelemetryPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInteraction<'a> {
    #[serde(rename = "type")]
    pub kind: TelemetryKind,
    pub video_id: i64,
    /// Stable across retries so the server can drop duplicates.
    pub event_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub data: &'a TelemetryPayload,
}

#[derive(Debug, Serialize)]
pub struct BatchBody<'a> {
    pub interactions: Vec<BatchInteraction<'a>>,
}

impl<'a> BatchBody<'a> {
    pub fn from_events(events: &'a [TelemetryEvent]) -> Self {
        Self {
            interactions: events
                .iter()
                .map(|event| BatchInteraction {
                    kind: event.kind(),
                    video_id: event.subject_id,
                    event_id: event.id,
                    recorded_at: event.created_at,
                    data: &event.payload,
                })
                .collect(),
        }
    }
}
