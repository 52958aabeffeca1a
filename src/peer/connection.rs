use crate::logger::{
    dump_candidate, dump_selected_pair, emit_connected, emit_connection_state, emit_disconnected,
    emit_remote_track, log,
};
use crate::media::source::{AUDIO_CHANNELS, AUDIO_SAMPLE_RATE};
use crate::media::{LocalMedia, MIME_TYPE_L16};
use crate::peer::data_channel::attach_dc;
use crate::peer::negotiation;
use crate::peer::state::{is_current, LOCAL_CANDIDATES, USER_ICE_SERVERS, VIDEO_SENDER};
use crate::peer::types::{IceCandidate, Role, ServerConfig};
use crate::utils::add_ice_url_scheme;
use std::sync::Arc;
use tauri::command;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;
use webrtc::{
    data_channel::{data_channel_init::RTCDataChannelInit, RTCDataChannel},
    ice_transport::ice_server::RTCIceServer,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        RTCPeerConnection,
    },
};

/// Side channel label; exactly one channel exists per call
const CHAT_CHANNEL: &str = "mockmate-chat";

/// Dynamic payload type for the PCM capability, clear of the defaults
const L16_PAYLOAD_TYPE: u8 = 63;

/// Media API with the default codecs plus the PCM audio capability
pub(crate) fn build_api() -> Result<API, webrtc::Error> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: MIME_TYPE_L16.to_owned(),
                clock_rate: AUDIO_SAMPLE_RATE,
                channels: AUDIO_CHANNELS,
                ..Default::default()
            },
            payload_type: L16_PAYLOAD_TYPE,
            ..Default::default()
        },
        RTPCodecType::Audio,
    )?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

/// Creates the peer for one call attempt; the initiator also creates the
/// side channel, the responder receives it via `on_data_channel`. Local
/// tracks are attached before anything else so the first offer carries
/// them.
pub async fn new_peer(
    role: Role,
    room: String,
    generation: u64,
    media: &Arc<LocalMedia>,
) -> Result<Arc<RTCPeerConnection>, webrtc::Error> {
    let api = build_api()?;

    // use custom servers when the user configured them
    let custom_servers = USER_ICE_SERVERS.lock().unwrap().clone();
    let config = rtc_config(custom_servers);

    let pc = Arc::new(api.new_peer_connection(config).await?);

    // fresh accumulator; candidates never survive across attempts
    LOCAL_CANDIDATES.lock().unwrap().clear();

    pc.add_track(Arc::clone(&media.audio_track) as Arc<dyn TrackLocal + Send + Sync>)
        .await?;
    let video_sender = pc
        .add_track(Arc::clone(&media.video_track) as Arc<dyn TrackLocal + Send + Sync>)
        .await?;
    *VIDEO_SENDER.lock().unwrap() = Some(video_sender);

    // every discovered candidate lands in the accumulator and triggers a
    // full republish of our record
    let cand_room = room.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        let room = cand_room.clone();
        if let Some(c) = cand {
            tauri::async_runtime::spawn(async move {
                dump_candidate("LOCAL", &c).await;

                if !is_current(generation) {
                    return; // a newer attempt owns the accumulator now
                }
                if let Ok(init) = c.to_json() {
                    let candidate = IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        connection_id: generation.to_string(),
                    };
                    let total = {
                        let mut list = LOCAL_CANDIDATES.lock().unwrap();
                        list.push(candidate);
                        list.len()
                    };
                    log(&format!("Added ICE candidate, total count: {}", total));
                    negotiation::republish_local(role, &room, generation).await;
                }
            });
        } else {
            // cand == None marks the end of gathering
            log("ICE candidate gathering completed (null candidate received)");
        }
        Box::pin(async {})
    }));

    pc.on_ice_gathering_state_change(Box::new(move |state| {
        log(&format!("ICE gathering state changed to: {:?}", state));
        Box::pin(async {})
    }));

    // connectivity machine surfaced 1:1 for the diagnostic display
    pc.on_ice_connection_state_change(Box::new(move |st: RTCIceConnectionState| {
        log(&format!("ICE connection state changed to: {st}"));
        if is_current(generation) {
            emit_connection_state(&st.to_string());
            if matches!(
                st,
                RTCIceConnectionState::Connected | RTCIceConnectionState::Completed
            ) {
                emit_connected();
            }
        }
        Box::pin(async {})
    }));

    // weak copy for the state handler's stats snapshot
    let pc_diag = Arc::downgrade(&pc);

    pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
        log(&format!("Peer connection state changed to: {:?}", st));
        if !is_current(generation) {
            return Box::pin(async {});
        }

        match st {
            RTCPeerConnectionState::Connected => {
                emit_connected();
            }

            RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed => {
                // no automatic recovery here: surface it, wait for a
                // manual reconnect
                if let Some(pc) = pc_diag.upgrade() {
                    tauri::async_runtime::spawn(async move {
                        dump_selected_pair(&pc, "BEFORE-FAIL").await;
                    });
                }
                emit_disconnected();
            }

            RTCPeerConnectionState::Closed => {
                emit_disconnected();
            }

            _ => {
                log(&format!("Peer connection state: {:?} - ignoring", st));
            }
        }
        Box::pin(async {})
    }));

    // remote media: either this or the connected state is enough to show
    // video, whichever lands first
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver: Arc<RTCRtpTransceiver>| {
            let kind = track.kind().to_string();
            log(&format!("Remote {kind} track arrived"));
            if is_current(generation) {
                emit_remote_track(&kind);
                emit_connected();
            }
            tauri::async_runtime::spawn(async move {
                // keep the transport draining; rendering happens in the UI
                while track.read_rtp().await.is_ok() {}
                log(&format!("Remote {kind} track ended"));
            });
            Box::pin(async {})
        },
    ));

    if role.is_initiator() {
        let dc = pc
            .create_data_channel(CHAT_CHANNEL, Some(RTCDataChannelInit::default()))
            .await?;
        attach_dc(&dc);
    } else {
        // registered before any remote description is set; the channel can
        // arrive at any point after that
        pc.on_data_channel(Box::new(|dc: Arc<RTCDataChannel>| {
            attach_dc(&dc);
            Box::pin(async {})
        }));
    }
    Ok(pc)
}

/// Configuration for the peer connection
fn rtc_config(custom_servers: Option<Vec<ServerConfig>>) -> RTCConfiguration {
    let ice_servers = if let Some(servers) = custom_servers {
        get_user_ice_servers(servers)
    } else {
        default_ice_servers()
    };

    RTCConfiguration {
        ice_servers,
        // more aggressive ICE settings
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

fn default_ice_servers() -> Vec<RTCIceServer> {
    vec![
        RTCIceServer {
            urls: vec![
                "stun:stun.l.google.com:19302".into(),
                "stun:stun1.l.google.com:19302".into(),
            ],
            ..Default::default()
        },
        // shared-credential relay, enough for demo traffic
        RTCIceServer {
            urls: vec!["turn:openrelay.metered.ca:80".into()],
            username: "openrelayproject".into(),
            credential: "openrelayproject".into(),
        },
    ]
}

/// Server configuration coming from the frontend
pub fn get_user_ice_servers(servers: Vec<ServerConfig>) -> Vec<RTCIceServer> {
    servers
        .into_iter()
        .map(|config| {
            let url = add_ice_url_scheme(&config);

            RTCIceServer {
                urls: vec![url],
                username: config.username.unwrap_or_default(),
                credential: config.credential.unwrap_or_default(),
            }
        })
        .collect()
}

/// Sets custom ICE servers; returns true on success, false on bad input
#[command]
pub fn set_ice_servers(servers: Vec<ServerConfig>) -> bool {
    log(&format!("Setting {} custom ICE servers", servers.len()));

    // validate before accepting
    for server in &servers {
        if server.url.is_empty() {
            log("Server URL cannot be empty");
            return false;
        }

        if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none()) {
            log("TURN servers require username and credential");
            return false;
        }
    }

    *USER_ICE_SERVERS.lock().unwrap() = Some(servers);
    log("Custom ICE servers set successfully");
    true
}

/// Returns the custom ICE servers, or the defaults when none are set
#[command]
pub fn get_ice_servers() -> Vec<ServerConfig> {
    USER_ICE_SERVERS.lock().unwrap().clone().unwrap_or_else(|| {
        vec![
            ServerConfig {
                id: "default-stun".into(),
                r#type: "stun".into(),
                url: "stun:stun.l.google.com:19302".into(),
                username: None,
                credential: None,
            },
            ServerConfig {
                id: "default-turn".into(),
                r#type: "turn".into(),
                url: "turn:openrelay.metered.ca:80".into(),
                username: Some("openrelayproject".into()),
                credential: Some("openrelayproject".into()),
            },
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_ice_servers_validates_input() {
        let empty_url = ServerConfig {
            id: "x".into(),
            r#type: "stun".into(),
            url: "".into(),
            username: None,
            credential: None,
        };
        assert!(!set_ice_servers(vec![empty_url]));

        let turn_without_creds = ServerConfig {
            id: "t".into(),
            r#type: "turn".into(),
            url: "relay.example.org:443".into(),
            username: None,
            credential: None,
        };
        assert!(!set_ice_servers(vec![turn_without_creds]));
    }

    #[test]
    fn test_default_servers_cover_stun_and_turn() {
        let defaults = default_ice_servers();
        assert!(defaults.iter().any(|s| s.urls.iter().any(|u| u.starts_with("stun:"))));
        assert!(defaults
            .iter()
            .any(|s| s.urls.iter().any(|u| u.starts_with("turn:")) && !s.credential.is_empty()));
    }

    #[tokio::test]
    async fn test_api_builds_with_custom_audio_codec() {
        // the L16 registration must not clash with the default codecs
        assert!(build_api().is_ok());
    }
}
