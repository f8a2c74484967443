use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex as StdMutex,
};

use chrono::Utc;
use tokio::sync::Mutex;

use crate::{
    auth::AuthState,
    backend::{BackendError, TimesheetBackend},
    settings::TrackerSettings,
    tracker::NativeTracker,
};

use super::{
    error::TrackingError,
    loops::{LoopTimings, SessionLoops},
    reconcile,
    state::{EngineStatus, SessionSnapshot, SessionState, SessionWatcher},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Result of the one-time startup reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Restore already ran in this process, or the user started tracking first.
    Skipped,
    /// No credentials, or the server rejected them. Restore runs again after sign-in.
    NotSignedIn,
    NothingActive,
    /// The current-timesheet query failed; the engine stays idle.
    BackendUnavailable,
    Resumed {
        elapsed_seconds: u64,
        /// The native tracker's counter was adopted over the server's figure.
        native_adopted: bool,
    },
}

/// Owns the tracking session: the start/stop handshakes with the backend and
/// the native tracker, startup restore, and the periodic loops.
#[derive(Clone)]
pub struct ReconciliationEngine {
    state: Arc<SessionState>,
    auth: Arc<AuthState>,
    backend: Arc<dyn TimesheetBackend>,
    native: Arc<dyn NativeTracker>,
    timings: LoopTimings,
    status: Arc<StdMutex<EngineStatus>>,
    // Held across a whole transition so start/stop/restore never interleave.
    loops: Arc<Mutex<Option<SessionLoops>>>,
    restored: Arc<AtomicBool>,
}

impl ReconciliationEngine {
    pub fn new(
        state: Arc<SessionState>,
        auth: Arc<AuthState>,
        backend: Arc<dyn TimesheetBackend>,
        native: Arc<dyn NativeTracker>,
        settings: &TrackerSettings,
    ) -> Self {
        Self {
            state,
            auth,
            backend,
            native,
            timings: LoopTimings::from(settings),
            status: Arc::new(StdMutex::new(EngineStatus::Idle)),
            loops: Arc::new(Mutex::new(None)),
            restored: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    pub fn watch(&self) -> SessionWatcher {
        self.state.watch()
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_status(&self, status: EngineStatus) {
        *self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = status;
    }

    /// Resumes a session the backend still considers active. Runs at most once
    /// per engine once signed in; failures are logged, never returned.
    pub async fn restore(&self) -> RestoreOutcome {
        if !self.auth.is_authenticated() {
            log_info!("Not signed in; deferring tracking restore");
            return RestoreOutcome::NotSignedIn;
        }

        if self.restored.swap(true, Ordering::SeqCst) {
            return RestoreOutcome::Skipped;
        }

        let mut loops = self.loops.lock().await;
        if self.status() != EngineStatus::Idle {
            return RestoreOutcome::Skipped;
        }

        let timesheets = match self.backend.get_current_timesheet().await {
            Ok(timesheets) => timesheets,
            Err(BackendError::NotFound { .. }) => {
                log_info!("No active timesheet to restore");
                return RestoreOutcome::NothingActive;
            }
            Err(BackendError::Unauthorized { .. }) => {
                log_info!("Not signed in; deferring tracking restore");
                self.restored.store(false, Ordering::SeqCst);
                return RestoreOutcome::NotSignedIn;
            }
            Err(err) => {
                log_error!("Failed to restore tracking state: {err}");
                return RestoreOutcome::BackendUnavailable;
            }
        };

        let Some(active) = timesheets.find_active() else {
            log_info!("No active timesheet to restore");
            return RestoreOutcome::NothingActive;
        };

        self.set_status(EngineStatus::Starting);

        let server_elapsed = reconcile::server_elapsed(
            active.start_time.as_deref(),
            Utc::now(),
            self.state.elapsed_seconds(),
        );
        let generation = self.state.begin(server_elapsed);

        let mut native_adopted = false;
        if self.native.is_available() {
            if let Err(err) = self.native.resume(server_elapsed).await {
                log_warn!("Failed to resume native tracker: {err:#}");
            }

            match self.native.get_elapsed().await {
                Ok(native_elapsed) => {
                    let adopted = reconcile::reconcile(server_elapsed, Some(native_elapsed));
                    self.state.raise_elapsed(generation, adopted);
                    native_adopted = adopted == native_elapsed;
                }
                Err(err) => log_warn!("Could not read native elapsed time: {err:#}"),
            }
        } else {
            log_warn!("Native tracker unavailable; continuing with server-derived elapsed time");
        }

        *loops = Some(self.spawn_loops(generation));
        self.set_status(EngineStatus::Tracking);

        let elapsed_seconds = self.state.elapsed_seconds();
        log_info!(
            "Restored tracking for timesheet {} at {}s (native adopted: {})",
            active.id,
            elapsed_seconds,
            native_adopted
        );

        RestoreOutcome::Resumed {
            elapsed_seconds,
            native_adopted,
        }
    }

    /// Opens a timesheet, then starts the native tracker. A no-op while a
    /// session is already running.
    pub async fn start(&self) -> Result<(), TrackingError> {
        if !self.auth.is_authenticated() {
            return Err(TrackingError::NotSignedIn);
        }

        let mut loops = self.loops.lock().await;
        if self.status() != EngineStatus::Idle {
            return Ok(());
        }

        if !self.native.is_available() {
            return Err(TrackingError::DesktopOnly);
        }

        self.set_status(EngineStatus::Starting);

        if let Err(err) = self.backend.open_timesheet().await {
            log_error!("Failed to open timesheet: {err}");
            self.set_status(EngineStatus::Idle);
            return Err(TrackingError::start_failed(err.detail()));
        }

        if let Err(err) = self.native.start().await {
            log_error!("Failed to start native tracker: {err:#}");
            // Do not leave a timesheet open with nothing measuring it.
            if let Err(close_err) = self.backend.close_timesheet().await {
                log_error!("Failed to close orphaned timesheet: {close_err}");
            }
            self.set_status(EngineStatus::Idle);
            return Err(TrackingError::start_failed(None));
        }

        let generation = self.state.begin(0);
        *loops = Some(self.spawn_loops(generation));
        self.set_status(EngineStatus::Tracking);

        log_info!("Tracking started");
        Ok(())
    }

    /// Stops the native tracker, then closes the timesheet. Local state always
    /// ends up stopped, whatever either call returns.
    pub async fn stop(&self) -> Result<(), TrackingError> {
        let mut loops = self.loops.lock().await;
        if self.status() != EngineStatus::Tracking {
            return Ok(());
        }

        self.set_status(EngineStatus::Stopping);
        if let Some(running) = loops.take() {
            running.cancel();
        }
        let _teardown = Teardown {
            state: &self.state,
            status: &self.status,
        };

        let native_result = if self.native.is_available() {
            self.native.stop().await
        } else {
            Ok(())
        };
        if let Err(err) = &native_result {
            log_error!("Failed to stop native tracker: {err:#}");
        }

        let backend_result = self.backend.close_timesheet().await;
        if let Err(err) = &backend_result {
            log_error!("Failed to close timesheet: {err}");
        }

        match (native_result, backend_result) {
            (_, Err(err)) => Err(TrackingError::stop_failed(err.detail())),
            (Err(_), Ok(())) => Err(TrackingError::stop_failed(None)),
            (Ok(()), Ok(())) => {
                log_info!("Tracking stopped");
                Ok(())
            }
        }
    }

    fn spawn_loops(&self, generation: super::state::Generation) -> SessionLoops {
        SessionLoops::spawn(
            generation,
            self.state.clone(),
            self.backend.clone(),
            self.native.clone(),
            self.timings,
        )
    }
}

/// Publishes the stopped state when `stop` finishes, fails, or is dropped mid-flight.
struct Teardown<'a> {
    state: &'a SessionState,
    status: &'a StdMutex<EngineStatus>,
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        self.state.end();
        *self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = EngineStatus::Idle;
    }
}
