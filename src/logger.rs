use crate::peer::state::{APP, WAS_CONNECTED};
use crate::peer::types::ChatMessage;
use serde::Serialize;
use tauri::Emitter;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::RTCPeerConnection;

/// Timestamped logging
pub fn log(msg: &str) {
    // honor the logging configuration
    if crate::config::LOGGING_ENABLED {
        #[cfg(debug_assertions)]
        {
            // development builds additionally honor dev::ENABLE_LOGGING
            if !crate::config::dev::ENABLE_LOGGING {
                return;
            }
        }

        let now = chrono::Local::now();
        println!("RUST: [{}] {}", now.format("%Y-%m-%d %H:%M:%S%.3f"), msg);
    }
}

/// Print an ICE candidate as it appears (Trickle-ICE)
pub async fn dump_candidate(label: &str, cand: &RTCIceCandidate) {
    if let Ok(init) = cand.to_json() {
        log(&format!(
            "Trickle {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?} username_fragment={:?}",
            init.candidate, init.sdp_mid, init.sdp_mline_index, init.username_fragment
        ));
    }
}

/// Quick getStats snapshot of the nominated candidate pair
pub async fn dump_selected_pair(pc: &RTCPeerConnection, moment: &str) {
    let stats = pc.get_stats().await;
    for (_, v) in stats.reports {
        if let webrtc::stats::StatsReportType::CandidatePair(pair) = v {
            if pair.nominated {
                log(&format!(
                    "STATS {moment}: {}:{}  type: {:?}  bytes={}/{} state={:?}",
                    pair.local_candidate_id,
                    pair.remote_candidate_id,
                    pair.stats_type,
                    pair.bytes_sent,
                    pair.bytes_received,
                    pair.state
                ));
            }
        }
    }
}

fn emit_event<P: Serialize + Clone>(evt: &str, payload: P) {
    if let Some(app) = APP.lock().unwrap().clone() {
        match app.emit(evt, payload) {
            Ok(_) => log(&format!("Emitted event: {}", evt)),
            Err(e) => log(&format!("Failed to emit event {}: {:?}", evt, e)),
        }
    } else {
        log(&format!("APP handle is None, cannot emit event: {}", evt));
    }
}

/// The call attempt is being set up; the UI shows its loading state
pub fn emit_connecting() {
    emit_event("mockmate-connecting", ());
}

/// Media is flowing (remote track arrived or the transport reported
/// connected, whichever came first)
pub fn emit_connected() {
    let mut was = WAS_CONNECTED.lock().unwrap();
    if *was {
        // both signals are sufficient; only the first one flips the UI
        return;
    }
    *was = true;
    drop(was);
    emit_event("mockmate-connected", ());
}

pub fn emit_disconnected() {
    *WAS_CONNECTED.lock().unwrap() = false;
    emit_event("mockmate-disconnected", ());
}

/// Raw connectivity state string for diagnostic display
pub fn emit_connection_state(state: &str) {
    emit_event("mockmate-connection-state", state.to_string());
}

/// Single human-readable failure message; the UI offers retry or reload
pub fn emit_error(msg: &str) {
    log(&format!("Surfacing error: {}", msg));
    emit_event("mockmate-error", msg.to_string());
}

pub fn emit_chat(msg: &ChatMessage) {
    emit_event("mockmate-chat", msg.clone());
}

/// A remote track started; kind is "audio" or "video"
pub fn emit_remote_track(kind: &str) {
    emit_event("mockmate-remote-track", kind.to_string());
}

pub fn emit_screen_share(active: bool) {
    emit_event("mockmate-screen-share", active);
}
