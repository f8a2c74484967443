//! Tauri plugin that hosts the tracking engine inside the desktop app.
//!
//! ```ignore
//! tauri::Builder::default()
//!     .plugin(activity_sync::plugin::init(OsProbe, Some(Arc::new(OsCamera))))
//!     .run(tauri::generate_context!())
//! ```

use std::sync::Arc;

use tauri::{
    plugin::{Builder, TauriPlugin},
    AppHandle, Emitter, Manager, Runtime,
};

use crate::{
    app::ActivityApp,
    tracker::{ActivityProbe, DesktopTracker, NativeTracker, ScreenshotSource},
    tracking::{commands, SessionSnapshot, SessionWatcher},
    utils::init_logging,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub const PLUGIN_NAME: &str = "activity-sync";
pub const TRACKING_STATE_EVENT: &str = "tracking-state-changed";

/// Builds the plugin around the shell's OS hooks. Screen captures are only
/// taken when `screenshots` is provided.
pub fn init<R, P>(probe: P, screenshots: Option<Arc<dyn ScreenshotSource>>) -> TauriPlugin<R>
where
    R: Runtime,
    P: ActivityProbe + 'static,
{
    Builder::new(PLUGIN_NAME)
        .invoke_handler(tauri::generate_handler![
            commands::start_tracking,
            commands::stop_tracking,
            commands::get_tracking_state,
            commands::get_engine_status,
            commands::set_auth_token,
            commands::clear_auth_token,
        ])
        .setup(move |app, _api| {
            init_logging();
            log_info!("Activity tracker starting up...");

            let data_dir = app.path().app_data_dir()?;
            let activity = ActivityApp::bootstrap(&data_dir, move |settings, backend| {
                let tracker = DesktopTracker::from_settings(probe, settings);
                let tracker = match screenshots {
                    Some(source) => {
                        tracker.with_screenshots(source, backend, settings.screenshot_interval())
                    }
                    None => tracker,
                };
                Arc::new(tracker) as Arc<dyn NativeTracker>
            })?;

            spawn_state_emitter(app.clone(), activity.engine.watch());

            // Without a stored credential this defers until `set_auth_token`.
            let engine = activity.engine.clone();
            tauri::async_runtime::spawn(async move {
                let outcome = engine.restore().await;
                log_info!("Startup reconciliation finished: {outcome:?}");
            });

            app.manage(activity);
            Ok(())
        })
        .build()
}

fn spawn_state_emitter<R: Runtime>(app_handle: AppHandle<R>, mut watcher: SessionWatcher) {
    tauri::async_runtime::spawn(async move {
        loop {
            let snapshot = watcher.changed().await;
            emit_tracking_state(&app_handle, snapshot);
        }
    });
}

fn emit_tracking_state<R: Runtime>(app_handle: &AppHandle<R>, snapshot: SessionSnapshot) {
    if let Err(err) = app_handle.emit(TRACKING_STATE_EVENT, snapshot) {
        log_debug!("failed to emit {TRACKING_STATE_EVENT}: {err}");
    }
}
