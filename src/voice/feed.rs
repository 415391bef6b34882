use anyhow::{bail, Result};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use tokio::sync::watch;

use super::backend::{AudioBackend, AudioCapture, TeardownStep};

/// Analyser size used by the web client (fftSize 256).
pub const DEFAULT_BIN_COUNT: usize = 128;

struct FeedShared {
    permission: AtomicBool,
    available: AtomicBool,
    bin_count: usize,
    frames: watch::Sender<Vec<u8>>,
    acquisitions: AtomicUsize,
    open_captures: AtomicUsize,
    teardown_log: Mutex<Vec<TeardownStep>>,
}

/// Audio backend for hosts that run the analyser themselves and push its
/// byte-frequency frames in.
#[derive(Clone)]
pub struct FeedBackend {
    shared: Arc<FeedShared>,
}

impl FeedBackend {
    pub fn new(permission_granted: bool) -> Self {
        Self::with_bin_count(permission_granted, DEFAULT_BIN_COUNT)
    }

    pub fn with_bin_count(permission_granted: bool, bin_count: usize) -> Self {
        let (frames, _) = watch::channel(vec![0; bin_count]);
        Self {
            shared: Arc::new(FeedShared {
                permission: AtomicBool::new(permission_granted),
                available: AtomicBool::new(true),
                bin_count,
                frames,
                acquisitions: AtomicUsize::new(0),
                open_captures: AtomicUsize::new(0),
                teardown_log: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Latest analyser output; readers always see the newest frame.
    pub fn push_frame(&self, bins: Vec<u8>) {
        self.shared.frames.send_replace(bins);
    }

    pub fn set_permission(&self, granted: bool) {
        self.shared.permission.store(granted, Ordering::SeqCst);
    }

    /// Simulates the input device disappearing.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    pub fn acquisitions(&self) -> usize {
        self.shared.acquisitions.load(Ordering::SeqCst)
    }

    /// Captures whose tracks have not been stopped yet.
    pub fn open_captures(&self) -> usize {
        self.shared.open_captures.load(Ordering::SeqCst)
    }

    pub fn teardown_log(&self) -> Vec<TeardownStep> {
        self.shared
            .teardown_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl AudioBackend for FeedBackend {
    fn request_permission(&self) -> bool {
        self.shared.permission.load(Ordering::SeqCst)
    }

    fn open(&self) -> Result<Box<dyn AudioCapture>> {
        if !self.shared.permission.load(Ordering::SeqCst) {
            bail!("microphone permission denied");
        }
        if !self.shared.available.load(Ordering::SeqCst) {
            bail!("no audio input device available");
        }

        self.shared.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.shared.open_captures.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FeedCapture {
            frames: self.shared.frames.subscribe(),
            shared: Arc::clone(&self.shared),
            context_open: true,
            source_connected: true,
            tracks_live: true,
        }))
    }
}

struct FeedCapture {
    frames: watch::Receiver<Vec<u8>>,
    shared: Arc<FeedShared>,
    context_open: bool,
    source_connected: bool,
    tracks_live: bool,
}

impl FeedCapture {
    fn log(&self, step: TeardownStep) {
        self.shared
            .teardown_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(step);
    }
}

impl AudioCapture for FeedCapture {
    fn frequency_bin_count(&self) -> usize {
        self.shared.bin_count
    }

    fn fill_frequency_data(&mut self, bins: &mut [u8]) {
        if !self.context_open {
            bins.fill(0);
            return;
        }
        let frame = self.frames.borrow_and_update();
        let n = frame.len().min(bins.len());
        bins[..n].copy_from_slice(&frame[..n]);
        bins[n..].fill(0);
    }

    fn close_context(&mut self) -> Result<()> {
        if !self.context_open {
            bail!("audio context already closed");
        }
        self.context_open = false;
        self.log(TeardownStep::CloseContext);
        Ok(())
    }

    fn disconnect_source(&mut self) -> Result<()> {
        if !self.source_connected {
            bail!("source node already disconnected");
        }
        self.source_connected = false;
        self.log(TeardownStep::DisconnectSource);
        Ok(())
    }

    fn stop_tracks(&mut self) -> Result<()> {
        if self.tracks_live {
            self.tracks_live = false;
            self.shared.open_captures.fetch_sub(1, Ordering::SeqCst);
        }
        self.log(TeardownStep::StopTracks);
        Ok(())
    }
}

impl Drop for FeedCapture {
    fn drop(&mut self) {
        if self.tracks_live {
            self.shared.open_captures.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
