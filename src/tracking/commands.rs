use tauri::State;

use crate::{
    app::ActivityApp,
    tracking::{EngineStatus, SessionSnapshot},
};

#[tauri::command]
pub async fn start_tracking(state: State<'_, ActivityApp>) -> Result<SessionSnapshot, String> {
    state.start_tracking().await
}

#[tauri::command]
pub async fn stop_tracking(state: State<'_, ActivityApp>) -> Result<SessionSnapshot, String> {
    state.stop_tracking().await
}

#[tauri::command]
pub fn get_tracking_state(state: State<'_, ActivityApp>) -> Result<SessionSnapshot, String> {
    Ok(state.tracking_state())
}

#[tauri::command]
pub fn get_engine_status(state: State<'_, ActivityApp>) -> Result<EngineStatus, String> {
    Ok(state.engine_status())
}

#[tauri::command]
pub async fn set_auth_token(
    state: State<'_, ActivityApp>,
    token: String,
) -> Result<SessionSnapshot, String> {
    state.sign_in(token).await
}

#[tauri::command]
pub fn clear_auth_token(state: State<'_, ActivityApp>) -> Result<(), String> {
    state.sign_out();
    Ok(())
}
