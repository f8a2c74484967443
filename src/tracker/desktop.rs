use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::{backend::TimesheetBackend, models::UsageSample, settings::TrackerSettings};

use super::{
    screenshot::{ScreenshotSource, ScreenshotUploads},
    NativeTracker,
};

pub const DEFAULT_IDLE_THRESHOLD_SECS: u64 = 120;

const UNKNOWN_APP: &str = "Unknown";

/// OS hooks supplied by the desktop shell.
pub trait ActivityProbe: Send + Sync {
    /// Name of the foreground application's executable, if it can be resolved.
    fn active_app(&self) -> Option<String>;

    /// Seconds since the last keyboard or mouse input.
    fn idle_seconds(&self) -> u64;
}

struct TrackerState {
    tracking: bool,
    started_at: Option<Instant>,
    current_app: Option<String>,
    app_started_at: Option<Instant>,
    last_idle_check: Instant,
    accumulated_idle: u64,
    screenshots: Option<CancellationToken>,
}

impl TrackerState {
    fn new(now: Instant) -> Self {
        Self {
            tracking: false,
            started_at: None,
            current_app: None,
            app_started_at: None,
            last_idle_check: now,
            accumulated_idle: 0,
            screenshots: None,
        }
    }

    fn begin(&mut self, started_at: Instant, now: Instant) {
        *self = Self {
            tracking: true,
            started_at: Some(started_at),
            ..Self::new(now)
        };
    }

    fn elapsed_at(&self, now: Instant) -> u64 {
        match (self.tracking, self.started_at) {
            (true, Some(started_at)) => now.saturating_duration_since(started_at).as_secs(),
            _ => 0,
        }
    }
}

/// In-process tracker that attributes wall time to the foreground application.
pub struct DesktopTracker<P> {
    probe: P,
    idle_threshold_secs: u64,
    screenshots: Option<ScreenshotUploads>,
    state: Mutex<TrackerState>,
}

impl<P: ActivityProbe> DesktopTracker<P> {
    pub fn new(probe: P) -> Self {
        Self::with_idle_threshold(probe, DEFAULT_IDLE_THRESHOLD_SECS)
    }

    pub fn from_settings(probe: P, settings: &TrackerSettings) -> Self {
        Self::with_idle_threshold(probe, settings.idle_threshold_secs)
    }

    pub fn with_idle_threshold(probe: P, idle_threshold_secs: u64) -> Self {
        Self {
            probe,
            idle_threshold_secs,
            screenshots: None,
            state: Mutex::new(TrackerState::new(Instant::now())),
        }
    }

    /// Captures the screen every `interval` while a session runs and uploads
    /// each capture through `backend`.
    pub fn with_screenshots(
        mut self,
        source: Arc<dyn ScreenshotSource>,
        backend: Arc<dyn TimesheetBackend>,
        interval: Duration,
    ) -> Self {
        self.screenshots = Some(ScreenshotUploads {
            source,
            backend,
            interval,
        });
        self
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns whether a new session began.
    fn start_at(&self, now: Instant) -> bool {
        let mut state = self.lock();
        if state.tracking {
            return false;
        }
        state.begin(now, now);
        true
    }

    fn stop_now(&self) {
        let mut state = self.lock();
        state.tracking = false;
        state.current_app = None;
        state.app_started_at = None;
        if let Some(screenshots) = state.screenshots.take() {
            screenshots.cancel();
        }
    }

    /// Returns whether a new session began.
    fn resume_at(&self, elapsed: u64, now: Instant) -> bool {
        let anchor = now
            .checked_sub(Duration::from_secs(elapsed))
            .unwrap_or(now);

        let mut state = self.lock();
        if !state.tracking {
            state.begin(anchor, now);
            return true;
        }

        // Only ever move the anchor back; elapsed must not shrink.
        if state.started_at.map_or(true, |current| anchor < current) {
            state.started_at = Some(anchor);
        }
        false
    }

    fn launch_screenshots(&self) {
        let Some(uploads) = &self.screenshots else {
            return;
        };

        let cancel = CancellationToken::new();
        if let Some(previous) = self.lock().screenshots.replace(cancel.clone()) {
            previous.cancel();
        }
        uploads.spawn(cancel);
    }

    fn tick_usage_at(
        &self,
        now: Instant,
        active_app: String,
        idle_secs: u64,
    ) -> Option<UsageSample> {
        let mut state = self.lock();
        if !state.tracking {
            return None;
        }

        if idle_secs >= self.idle_threshold_secs {
            state.accumulated_idle += now.saturating_duration_since(state.last_idle_check).as_secs();
        } else {
            state.accumulated_idle = 0;
        }
        state.last_idle_check = now;

        let (Some(previous_app), Some(app_started_at)) =
            (state.current_app.clone(), state.app_started_at)
        else {
            state.current_app = Some(active_app);
            state.app_started_at = Some(now);
            return None;
        };

        let active_duration = now.saturating_duration_since(app_started_at).as_secs();
        if previous_app == active_app && active_duration == 0 {
            return None;
        }

        state.current_app = Some(active_app);
        state.app_started_at = Some(now);

        Some(UsageSample {
            application: previous_app,
            active_duration,
            idle_duration: state.accumulated_idle,
            timestamp: Utc::now(),
        })
    }

    fn elapsed_at(&self, now: Instant) -> u64 {
        self.lock().elapsed_at(now)
    }
}

#[async_trait]
impl<P: ActivityProbe> NativeTracker for DesktopTracker<P> {
    fn is_available(&self) -> bool {
        true
    }

    async fn start(&self) -> Result<()> {
        if self.start_at(Instant::now()) {
            self.launch_screenshots();
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stop_now();
        Ok(())
    }

    async fn resume(&self, elapsed: u64) -> Result<()> {
        if self.resume_at(elapsed, Instant::now()) {
            self.launch_screenshots();
        }
        Ok(())
    }

    async fn tick_usage(&self) -> Result<Option<UsageSample>> {
        let active_app = self
            .probe
            .active_app()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_APP.to_string());
        let idle_secs = self.probe.idle_seconds();
        Ok(self.tick_usage_at(Instant::now(), active_app, idle_secs))
    }

    async fn get_elapsed(&self) -> Result<u64> {
        Ok(self.elapsed_at(Instant::now()))
    }
}
