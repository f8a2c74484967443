use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::tracker::DEFAULT_SCREENSHOT_INTERVAL_SECS;

const BACKEND_URL_ENV: &str = "ACTIVITY_SYNC_BACKEND_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub backend_url: String,
    pub request_timeout_secs: u64,
    pub tick_interval_ms: u64,
    pub usage_poll_interval_ms: u64,
    pub auto_sync_interval_secs: u64,
    /// The elapsed ticker asks the native tracker for its counter every N ticks.
    pub drift_check_every_ticks: u32,
    /// Native must lead the local counter by more than this before the local counter snaps.
    pub drift_threshold_secs: u64,
    pub idle_threshold_secs: u64,
    /// Seconds between screen captures while tracking.
    pub screenshot_interval_secs: u64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:9000".into(),
            request_timeout_secs: 30,
            tick_interval_ms: 1_000,
            usage_poll_interval_ms: 1_000,
            auto_sync_interval_secs: 120,
            drift_check_every_ticks: 10,
            drift_threshold_secs: 2,
            idle_threshold_secs: 120,
            screenshot_interval_secs: DEFAULT_SCREENSHOT_INTERVAL_SECS,
        }
    }
}

impl TrackerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn usage_poll_interval(&self) -> Duration {
        Duration::from_millis(self.usage_poll_interval_ms.max(1))
    }

    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_secs(self.auto_sync_interval_secs.max(1))
    }

    pub fn screenshot_interval(&self) -> Duration {
        Duration::from_secs(self.screenshot_interval_secs.max(1))
    }

    pub fn drift_check_every(&self) -> u32 {
        self.drift_check_every_ticks.max(1)
    }

    fn with_backend_override(mut self, backend_url: Option<String>) -> Self {
        if let Some(url) = backend_url.filter(|url| !url.trim().is_empty()) {
            self.backend_url = url;
        }
        self
    }
}

/// Settings persisted as JSON next to the app's other data files.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<TrackerSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            TrackerSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Stored settings with environment overrides applied.
    pub fn settings(&self) -> TrackerSettings {
        self.stored().with_backend_override(env::var(BACKEND_URL_ENV).ok())
    }

    fn stored(&self) -> TrackerSettings {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn update(&self, settings: TrackerSettings) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &TrackerSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
