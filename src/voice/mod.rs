//! Voice-activity detection over a live microphone analyser.

pub mod analysis;
pub mod backend;
pub mod controller;
pub mod feed;

pub use analysis::{intensity, threshold_for, VoiceDetector, VoiceInteraction, VoiceMetrics, MIN_INTERACTION};
pub use backend::{release_capture, AudioBackend, AudioCapture, TeardownStep};
pub use controller::{PermissionState, VoiceTracker, FRAME_INTERVAL, VOICE_INTERACTION_TYPE};
pub use feed::{FeedBackend, DEFAULT_BIN_COUNT};
