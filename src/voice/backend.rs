use anyhow::Result;

/// A live microphone graph: source node -> analyser, inside an audio context.
pub trait AudioCapture: Send {
    fn frequency_bin_count(&self) -> usize;

    /// Copy the analyser's current byte-frequency data into `bins`.
    fn fill_frequency_data(&mut self, bins: &mut [u8]);

    fn close_context(&mut self) -> Result<()>;
    fn disconnect_source(&mut self) -> Result<()>;
    /// Stop the underlying media tracks, turning off the mic indicator.
    fn stop_tracks(&mut self) -> Result<()>;
}

/// Grants microphone access and opens captures.
pub trait AudioBackend: Send + Sync {
    fn request_permission(&self) -> bool;

    /// Acquire a fresh microphone stream. Every call is a new acquisition.
    fn open(&self) -> Result<Box<dyn AudioCapture>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    CloseContext,
    DisconnectSource,
    StopTracks,
}

/// Run every release step even when an earlier one fails. Returns the
/// failures, in step order.
pub fn release_capture(capture: &mut dyn AudioCapture) -> Vec<(TeardownStep, anyhow::Error)> {
    let mut failures = Vec::new();

    if let Err(err) = capture.close_context() {
        failures.push((TeardownStep::CloseContext, err));
    }
    if let Err(err) = capture.disconnect_source() {
        failures.push((TeardownStep::DisconnectSource, err));
    }
    if let Err(err) = capture.stop_tracks() {
        failures.push((TeardownStep::StopTracks, err));
    }

    failures
}
