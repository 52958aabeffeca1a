pub mod connection;
pub mod data_channel;
pub mod negotiation;
pub mod state;
pub mod types;

pub use state::{
    APP, DATA_CH, LOCAL_CANDIDATES, LOCAL_MEDIA, PEER, ROOM_WATCH, SCREEN_SHARE, USER_ICE_SERVERS,
    VIDEO_SENDER, WAS_CONNECTED,
};
pub use types::{ChatMessage, IceCandidate, Role, SdpPayload, ServerConfig, SignalingRecord};
