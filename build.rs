const COMMANDS: &[&str] = &[
    "start_tracking",
    "stop_tracking",
    "get_tracking_state",
    "get_engine_status",
    "set_auth_token",
    "clear_auth_token",
];

fn main() {
    tauri_plugin::Builder::new(COMMANDS).build();
}
