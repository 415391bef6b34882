//! Scroll-speed engagement sampling.

pub mod controller;
pub mod state;

pub use controller::{ScrollTracker, SCROLL_END_DEBOUNCE};
pub use state::{engagement_score, ScrollDirection, ScrollMetrics, ScrollPattern, ScrollState};
