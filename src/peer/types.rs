use serde::{Deserialize, Serialize};
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Which side of the interview this tab plays.
///
/// The interviewer always initiates the negotiation; the interviewee
/// answers. Creating the side channel is keyed off this, so exactly one
/// data channel exists per call.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Interviewer,
    Interviewee,
}

impl Role {
    pub fn is_initiator(self) -> bool {
        matches!(self, Role::Interviewer)
    }
}

/// SDP payload with metadata
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SdpPayload {
    pub sdp: RTCSessionDescription,
    pub id: String,
    pub ts: i64,
}

/// ICE candidate for the WebRTC connection
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
    pub connection_id: String, // connection id for matching candidates to attempts
}

/// One direction's record in the signaling store: the session description
/// plus every candidate discovered so far. Republished wholesale, so the
/// candidate list only ever grows between publishes.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SignalingRecord {
    pub sdp_payload: SdpPayload,
    pub candidates: Vec<IceCandidate>,
}

/// ICE server configuration
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Chat message carried over the side channel
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatMessage {
    pub from: String,
    pub body: String,
    pub ts: i64,
}

/// Shareable room invite
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InvitePayload {
    pub room: String,
    pub role: Role,
    pub host: String,
    pub ts: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serde_names() {
        assert_eq!(
            serde_json::to_string(&Role::Interviewer).unwrap(),
            "\"interviewer\""
        );
        let role: Role = serde_json::from_str("\"interviewee\"").unwrap();
        assert_eq!(role, Role::Interviewee);
    }

    #[test]
    fn test_initiator_is_interviewer() {
        assert!(Role::Interviewer.is_initiator());
        assert!(!Role::Interviewee.is_initiator());
    }

    #[test]
    fn test_chat_message_round_trip() {
        let msg = ChatMessage {
            from: "Sam".into(),
            body: "ready when you are".into(),
            ts: 1_700_000_123,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.from, "Sam");
        assert_eq!(back.body, msg.body);
    }
}
