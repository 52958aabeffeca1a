mod commands;
mod config;
mod logger;
mod media;
mod peer;
mod session;
mod signaling;
mod utils;

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .invoke_handler(tauri::generate_handler![
            // Call lifecycle
            commands::call_api::create_room,
            commands::call_api::join_interview,
            commands::call_api::leave_interview,
            commands::call_api::reconnect,
            // In-call controls
            commands::media_api::toggle_microphone,
            commands::media_api::toggle_camera,
            commands::media_api::start_screen_share,
            commands::media_api::stop_screen_share,
            // Chat and diagnostics
            commands::util_api::send_chat_message,
            commands::util_api::is_connected,
            commands::util_api::media_state,
            commands::util_api::connection_state,
            commands::util_api::check_ice_server_availability,
            commands::util_api::room_invite,
            commands::util_api::parse_invite,
            // ICE configuration
            peer::connection::set_ice_servers,
            peer::connection::get_ice_servers,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
