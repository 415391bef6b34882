//! Telemetry events and their delivery to the tracking backend.

pub mod auth;
pub mod queue;
pub mod transport;
pub mod types;
pub mod uploader;

pub use auth::{SharedToken, StaticToken, TokenProvider};
pub use queue::RetryQueue;
pub use transport::{DeliveryError, DeliveryFuture, HttpTransport, TelemetryTransport, BATCH_ENDPOINT};
pub use types::{
    BatchBody, GazeReport, ScrollReport, TelemetryEvent, TelemetryKind, TelemetryPayload,
    ViewportData, VoiceReport,
};
pub use uploader::{DisposeReport, FlushOutcome, TelemetryUploader};
