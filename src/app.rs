use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};

use crate::{
    auth::AuthState,
    backend::{HttpBackend, TimesheetBackend},
    settings::{SettingsStore, TrackerSettings},
    tracker::NativeTracker,
    tracking::{EngineStatus, ReconciliationEngine, SessionSnapshot, SessionState, TrackingError},
    utils::init_logging,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Everything the presentation layer talks to.
pub struct ActivityApp {
    pub auth: Arc<AuthState>,
    pub engine: ReconciliationEngine,
    pub settings: SettingsStore,
}

impl ActivityApp {
    pub fn new(
        settings: SettingsStore,
        auth: Arc<AuthState>,
        backend: Arc<dyn TimesheetBackend>,
        native: Arc<dyn NativeTracker>,
    ) -> Self {
        let engine = ReconciliationEngine::new(
            Arc::new(SessionState::new()),
            auth.clone(),
            backend,
            native,
            &settings.settings(),
        );

        Self {
            auth,
            engine,
            settings,
        }
    }

    /// Loads settings from `app_data_dir` and wires the backend client. The
    /// native tracker is built by `native` so it can share the backend.
    pub fn bootstrap<F>(app_data_dir: &Path, native: F) -> Result<Self>
    where
        F: FnOnce(&TrackerSettings, Arc<dyn TimesheetBackend>) -> Arc<dyn NativeTracker>,
    {
        std::fs::create_dir_all(app_data_dir)
            .with_context(|| format!("Failed to create {}", app_data_dir.display()))?;

        let settings = SettingsStore::new(app_data_dir.join("settings.json"))?;
        let current = settings.settings();

        let auth = Arc::new(AuthState::new());
        let backend: Arc<dyn TimesheetBackend> = Arc::new(
            HttpBackend::from_settings(&current, auth.clone())
                .context("Failed to build backend client")?,
        );
        let native = native(&current, backend.clone());

        Ok(Self::new(settings, auth, backend, native))
    }

    pub async fn start_tracking(&self) -> Result<SessionSnapshot, String> {
        self.engine
            .start()
            .await
            .map_err(|err| report("start", err))?;
        Ok(self.engine.snapshot())
    }

    pub async fn stop_tracking(&self) -> Result<SessionSnapshot, String> {
        self.engine
            .stop()
            .await
            .map_err(|err| report("stop", err))?;
        Ok(self.engine.snapshot())
    }

    pub fn tracking_state(&self) -> SessionSnapshot {
        self.engine.snapshot()
    }

    pub fn engine_status(&self) -> EngineStatus {
        self.engine.status()
    }

    /// Stores the credential, then picks up a session left running on the
    /// server if restore has not happened yet.
    pub async fn sign_in(&self, token: String) -> Result<SessionSnapshot, String> {
        if token.trim().is_empty() {
            return Err("token must not be empty".into());
        }
        self.auth.set_token(token);

        let outcome = self.engine.restore().await;
        log_debug!("Restore after sign-in: {outcome:?}");
        Ok(self.engine.snapshot())
    }

    pub fn sign_out(&self) {
        self.auth.clear_token();
    }
}

/// Logs a failed command and returns its user-facing message.
fn report(action: &str, err: TrackingError) -> String {
    if err.is_precondition() {
        log_debug!("{action} rejected: {err}");
    } else {
        log_warn!("{action} failed: {err}");
    }
    err.user_message()
}

/// Boots the tracking side outside of Tauri: logging, settings, backend
/// client, then the one-time restore of a session left running by a previous
/// process. `token` is the stored credential from the last sign-in, if any.
pub async fn launch(
    app_data_dir: &Path,
    native: Arc<dyn NativeTracker>,
    token: Option<String>,
) -> Result<ActivityApp> {
    init_logging();

    log_info!("Activity tracker starting up...");

    let app = ActivityApp::bootstrap(app_data_dir, |_, _| native)?;
    if let Some(token) = token {
        app.auth.set_token(token);
    }

    let outcome = app.engine.restore().await;
    log_info!("Startup reconciliation finished: {outcome:?}");

    Ok(app)
}
