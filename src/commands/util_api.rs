use crate::logger::log;
use crate::peer::data_channel::send_chat;
use crate::peer::state::{LOCAL_MEDIA, PEER, WAS_CONNECTED};
use crate::peer::types::{InvitePayload, Role, ServerConfig};
use crate::utils::{add_ice_url_scheme, decode_invite, encode_invite};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tauri::command;
use tokio::sync::mpsc;
use tokio::time::timeout;
use webrtc::{
    api::APIBuilder,
    ice_transport::{ice_gatherer_state::RTCIceGathererState, ice_server::RTCIceServer},
    peer_connection::{configuration::RTCConfiguration, RTCPeerConnection},
};

/// One chat line over the side channel
#[command]
pub async fn send_chat_message(body: String) -> bool {
    send_chat(body).await
}

/// Whether media is flowing from the remote side
#[command]
pub fn is_connected() -> bool {
    *WAS_CONNECTED.lock().unwrap()
}

#[derive(Serialize, Clone)]
pub struct MediaState {
    pub microphone: bool,
    pub camera: bool,
}

/// Current local mute/camera flags, for UI resync
#[command]
pub fn media_state() -> MediaState {
    match LOCAL_MEDIA.lock().unwrap().as_ref() {
        Some(media) => MediaState {
            microphone: media.audio_enabled(),
            camera: media.video_enabled(),
        },
        None => MediaState {
            microphone: false,
            camera: false,
        },
    }
}

/// Current connectivity state string for the diagnostic display
#[command]
pub async fn connection_state() -> String {
    let pc = { PEER.lock().unwrap().as_ref().cloned() };
    match pc {
        Some(pc) => pc.ice_connection_state().to_string(),
        None => "new".into(),
    }
}

/// Shareable invite code for the interviewee
#[command]
pub fn room_invite(room: String, host: String) -> String {
    encode_invite(&InvitePayload {
        room,
        role: Role::Interviewee,
        host,
        ts: chrono::Utc::now().timestamp(),
    })
}

/// Decodes an invite; None when the code is not one of ours
#[command]
pub fn parse_invite(encoded: String) -> Option<InvitePayload> {
    decode_invite(&encoded)
}

/// Probes a single ICE server by gathering against it and looking for the
/// candidate type it should produce (srflx for STUN, relay for TURN).
#[command]
pub async fn check_ice_server_availability(config: ServerConfig) -> bool {
    log(&format!(
        "check_ice_server_availability called with config: {:?}",
        config
    ));

    let url = add_ice_url_scheme(&config);
    let ice_server = RTCIceServer {
        urls: vec![url],
        username: config.username.clone().unwrap_or_default(),
        credential: config.credential.clone().unwrap_or_default(),
    };

    let rtc_config = RTCConfiguration {
        ice_servers: vec![ice_server],
        ..Default::default()
    };

    let api = APIBuilder::new().build();
    match api.new_peer_connection(rtc_config).await {
        Ok(pc) => check_via_ice_gathering(Arc::new(pc), &config.r#type).await,
        Err(e) => {
            log(&format!("Failed to create probe connection: {:?}", e));
            false
        }
    }
}

async fn check_via_ice_gathering(pc: Arc<RTCPeerConnection>, server_type: &str) -> bool {
    let (gather_tx, mut gather_rx) = mpsc::channel(10);
    pc.on_ice_gathering_state_change(Box::new(move |state| {
        let tx = gather_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(state).await;
        });
        Box::pin(async {})
    }));

    // STUN availability shows as a srflx candidate, TURN as a relay one
    let (candidate_tx, mut candidate_rx) = mpsc::channel(10);
    let wanted = if server_type == "turn" { "relay" } else { "srflx" };
    pc.on_ice_candidate(Box::new(move |candidate| {
        let tx = candidate_tx.clone();
        Box::pin(async move {
            if let Some(c) = candidate {
                if let Ok(json) = c.to_json() {
                    if json.candidate.contains(wanted) {
                        let _ = tx.send(true).await;
                    }
                }
            }
        })
    }));

    // a data channel plus an offer is the cheapest way to start gathering
    if let Err(e) = pc.create_data_channel("probe", None).await {
        log(&format!("Probe data channel failed: {:?}", e));
        return false;
    }
    let offer = match pc.create_offer(None).await {
        Ok(offer) => offer,
        Err(e) => {
            log(&format!("Probe offer failed: {:?}", e));
            return false;
        }
    };
    if let Err(e) = pc.set_local_description(offer).await {
        log(&format!("Probe local description failed: {:?}", e));
        return false;
    }

    let check_timeout = Duration::from_secs(10);
    let available = tokio::select! {
        result = timeout(check_timeout, candidate_rx.recv()) => {
            matches!(result, Ok(Some(true)))
        }
        // gathering finished without the candidate we were waiting for
        _ = async {
            while let Some(state) = gather_rx.recv().await {
                if state == RTCIceGathererState::Complete {
                    break;
                }
            }
        } => false,
    };

    let _ = pc.close().await;
    log(&format!(
        "ICE server {} availability: {}",
        server_type, available
    ));
    available
}
