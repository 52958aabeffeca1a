use crate::logger::log;
use crate::peer::types::{InvitePayload, ServerConfig};
use base64::{engine::general_purpose, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use rand::Rng;
use std::io::{Read, Write};

/// Room ids look like `peer-1700000000-ab12cd34`.
pub fn random_room_id() -> String {
    format!(
        "peer-{}-{}",
        chrono::Utc::now().timestamp(),
        hex::encode(rand::rng().random::<[u8; 4]>())
    )
}

// Prepends the protocol scheme to an ICE server URL when it is missing
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    // URLs already carrying "turn:" or "stun:" pass through unchanged
    if config.url.starts_with("turn:") || config.url.starts_with("stun:") {
        config.url.clone()
    } else {
        // otherwise pick the scheme from the server type
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}

/// Encodes a room invite: JSON -> gzip -> base64
pub fn encode_invite(p: &InvitePayload) -> String {
    let json = serde_json::to_vec(p).unwrap_or_default();

    // writing into a Vec cannot fail
    let mut gz = GzEncoder::new(Vec::new(), Compression::fast());
    let _ = gz.write_all(&json);
    let compressed = gz.finish().unwrap_or(json);

    general_purpose::STANDARD.encode(compressed)
}

/// Decodes a room invite, refusing oversized payloads
pub fn decode_invite(s: &str) -> Option<InvitePayload> {
    let compressed = match general_purpose::STANDARD.decode(s) {
        Ok(bytes) => bytes,
        Err(e) => {
            log(&format!("Invite is not valid base64: {:?}", e));
            return None;
        }
    };

    // cap decompressed size to guard against zip bombs
    const MAX_DECOMPRESSED_SIZE: u64 = 64 * 1024; // 64 KiB
    let gz = GzDecoder::new(&compressed[..]);
    let mut json = Vec::new();
    if let Err(e) = gz.take(MAX_DECOMPRESSED_SIZE).read_to_end(&mut json) {
        log(&format!("Failed to decompress invite: {:?}", e));
        return None;
    }

    match serde_json::from_slice(&json) {
        Ok(payload) => Some(payload),
        Err(e) => {
            log(&format!("Invite payload did not parse: {:?}", e));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::types::Role;

    #[test]
    fn test_room_id_shape() {
        let id = random_room_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "peer");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn test_ice_url_scheme() {
        let stun = ServerConfig {
            id: "s".into(),
            r#type: "stun".into(),
            url: "stun.example.org:3478".into(),
            username: None,
            credential: None,
        };
        assert_eq!(add_ice_url_scheme(&stun), "stun:stun.example.org:3478");

        let turn = ServerConfig {
            r#type: "turn".into(),
            url: "relay.example.org:443".into(),
            ..stun.clone()
        };
        assert_eq!(add_ice_url_scheme(&turn), "turn:relay.example.org:443");

        let already = ServerConfig {
            url: "turn:relay.example.org:443".into(),
            ..turn
        };
        assert_eq!(add_ice_url_scheme(&already), "turn:relay.example.org:443");
    }

    #[test]
    fn test_invite_round_trip() {
        let invite = InvitePayload {
            room: "peer-1700000000-ab12cd34".into(),
            role: Role::Interviewee,
            host: "Jordan".into(),
            ts: 1_700_000_000,
        };
        let encoded = encode_invite(&invite);
        let decoded = decode_invite(&encoded).expect("round trip");
        assert_eq!(decoded.room, invite.room);
        assert_eq!(decoded.role, Role::Interviewee);
        assert_eq!(decoded.host, "Jordan");
    }

    #[test]
    fn test_invite_rejects_garbage() {
        assert!(decode_invite("not base64 at all!!!").is_none());
        let junk = base64::engine::general_purpose::STANDARD.encode(b"plain junk");
        assert!(decode_invite(&junk).is_none());
    }
}
