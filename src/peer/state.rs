use crate::media::LocalMedia;
use crate::peer::types::{IceCandidate, ServerConfig};
use crate::signaling::watch::RoomWatch;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tauri::AppHandle;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::{
    data_channel::RTCDataChannel, peer_connection::RTCPeerConnection,
    rtp_transceiver::rtp_sender::RTCRtpSender,
};

/// ========== GLOBAL STATE ==========

/// WebRTC peer connection of the current attempt
pub static PEER: Lazy<Mutex<Option<Arc<RTCPeerConnection>>>> = Lazy::new(|| Mutex::new(None));

/// Side channel for in-call chat
pub static DATA_CH: Lazy<Mutex<Option<Arc<RTCDataChannel>>>> = Lazy::new(|| Mutex::new(None));

/// Camera + microphone of the current attempt
pub static LOCAL_MEDIA: Lazy<Mutex<Option<Arc<LocalMedia>>>> = Lazy::new(|| Mutex::new(None));

/// Sender carrying the outgoing video track; screen share swaps through it
pub static VIDEO_SENDER: Lazy<Mutex<Option<Arc<RTCRtpSender>>>> = Lazy::new(|| Mutex::new(None));

/// Active screen share, if any
pub static SCREEN_SHARE: Lazy<Mutex<Option<ScreenShare>>> = Lazy::new(|| Mutex::new(None));

/// Locally discovered candidates, not shared between attempts
pub static LOCAL_CANDIDATES: Lazy<Mutex<Vec<IceCandidate>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Watch task polling the signaling store for the remote side
pub static ROOM_WATCH: Lazy<Mutex<Option<RoomWatch>>> = Lazy::new(|| Mutex::new(None));

/// Handle for emitting events to the UI
pub static APP: Lazy<Mutex<Option<AppHandle>>> = Lazy::new(|| Mutex::new(None));

/// UI-visible "media is flowing" flag; set on remote track arrival or on
/// the connected state, whichever comes first
pub static WAS_CONNECTED: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(false));

/// Runtime override for the ICE server list
pub static USER_ICE_SERVERS: Lazy<Mutex<Option<Vec<ServerConfig>>>> =
    Lazy::new(|| Mutex::new(None));

/// Attempt counter. Only callbacks carrying the latest generation are
/// honored, so a rapid reconnect cannot resurrect a torn-down attempt.
static GENERATION: AtomicU64 = AtomicU64::new(0);

pub struct ScreenShare {
    pub track: Arc<TrackLocalStaticSample>,
    pub feed: tauri::async_runtime::JoinHandle<()>,
}

pub fn next_generation() -> u64 {
    GENERATION.fetch_add(1, Ordering::SeqCst) + 1
}

pub fn current_generation() -> u64 {
    GENERATION.load(Ordering::SeqCst)
}

pub fn is_current(generation: u64) -> bool {
    current_generation() == generation
}

/// ========== CONSTANTS ==========

/// Bounded retry for offer/answer creation and description setting
pub const NEGOTIATION_ATTEMPTS: u32 = 3;

/// Base delay of the negotiation backoff (doubles per attempt)
pub const NEGOTIATION_BACKOFF: Duration = Duration::from_millis(250);
