use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

pub const DEFAULT_VOICE_SENSITIVITY: u8 = 50;
pub const DEFAULT_SCROLL_THRESHOLD_PX: f64 = 50.0;

/// User-facing switches from the tracking settings panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackingSettings {
    pub eye_tracking_enabled: bool,
    pub scroll_tracking_enabled: bool,
    pub voice_tracking_enabled: bool,
    /// 0-100; higher means quieter sounds count as voice.
    pub voice_sensitivity: u8,
    pub scroll_threshold_px: f64,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            eye_tracking_enabled: true,
            scroll_tracking_enabled: true,
            voice_tracking_enabled: true,
            voice_sensitivity: DEFAULT_VOICE_SENSITIVITY,
            scroll_threshold_px: DEFAULT_SCROLL_THRESHOLD_PX,
        }
    }
}

impl TrackingSettings {
    /// Pull out-of-range values back into their valid domain.
    pub fn normalized(mut self) -> Self {
        self.voice_sensitivity = self.voice_sensitivity.min(100);
        if !self.scroll_threshold_px.is_finite() || self.scroll_threshold_px < 0.0 {
            self.scroll_threshold_px = DEFAULT_SCROLL_THRESHOLD_PX;
        }
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredSettings {
    tracking: TrackingSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<StoredSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str::<StoredSettings>(&contents).unwrap_or_default()
        } else {
            StoredSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(StoredSettings {
                tracking: data.tracking.normalized(),
            }),
        })
    }

    pub fn tracking(&self) -> TrackingSettings {
        self.read().tracking.clone()
    }

    pub fn update_tracking(&self, settings: TrackingSettings) -> Result<TrackingSettings> {
        let settings = settings.normalized();
        let mut guard = self.write();
        guard.tracking = settings.clone();
        self.persist(&guard)?;
        Ok(settings)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: StoredSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Malformed settings in {}", self.path.display()))?;
        self.write().tracking = data.tracking.normalized();
        Ok(())
    }

    fn persist(&self, data: &StoredSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, StoredSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoredSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Delivery settings for the telemetry uploader.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub api_base_url: String,
    pub enabled: bool,
    pub flush_interval: Duration,
    /// Queue length that forces a flush ahead of the timer.
    pub max_queue: usize,
    pub request_timeout: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".into(),
            enabled: true,
            flush_interval: Duration::from_secs(5),
            max_queue: 10,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl UploaderConfig {
    /// Defaults overlaid with `NOJOOM_API_BASE_URL`, `NOJOOM_TELEMETRY_DISABLED`
    /// and `NOJOOM_TELEMETRY_FLUSH_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("NOJOOM_API_BASE_URL") {
            if !url.trim().is_empty() {
                config.api_base_url = url.trim().trim_end_matches('/').to_string();
            }
        }

        config.enabled = !std::env::var("NOJOOM_TELEMETRY_DISABLED")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if let Some(secs) = std::env::var("NOJOOM_TELEMETRY_FLUSH_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        {
            config.flush_interval = Duration::from_secs(secs);
        }

        config
    }
}
