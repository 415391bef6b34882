//! Pointer-position stand-in for gaze tracking.

pub mod controller;
pub mod state;
pub mod target;

pub use controller::{GazeTracker, GAZE_REPORT_INTERVAL};
pub use state::{GazeMetrics, GazeSample, GazeState, Rect, Viewport};
pub use target::{SharedTarget, TargetElement};
