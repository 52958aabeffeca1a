use crate::peer::types::SignalingRecord;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Cadence of the watch loop's redundant replay tick
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Rooms with no writes for this long are dropped on the next write
const ROOM_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

struct RoomSignals {
    offer: Option<SignalingRecord>,
    answer: Option<SignalingRecord>,
    notify: Arc<Notify>,
    expires_at: Instant,
}

impl RoomSignals {
    fn new() -> Self {
        Self {
            offer: None,
            answer: None,
            notify: Arc::new(Notify::new()),
            expires_at: Instant::now() + ROOM_IDLE_TTL,
        }
    }
}

static ROOMS: Lazy<Mutex<HashMap<String, RoomSignals>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Upsert the offer record for a room, replacing any previous one.
pub fn set_offer(room: &str, record: SignalingRecord) {
    write(room, |signals| signals.offer = Some(record));
}

/// Upsert the answer record for a room, replacing any previous one.
pub fn set_answer(room: &str, record: SignalingRecord) {
    write(room, |signals| signals.answer = Some(record));
}

pub fn offer(room: &str) -> Option<SignalingRecord> {
    ROOMS.lock().unwrap().get(room).and_then(|s| s.offer.clone())
}

pub fn answer(room: &str) -> Option<SignalingRecord> {
    ROOMS
        .lock()
        .unwrap()
        .get(room)
        .and_then(|s| s.answer.clone())
}

pub fn remove_room(room: &str) {
    ROOMS.lock().unwrap().remove(room);
}

/// Notify handle watchers park on. Created eagerly so a watcher can
/// subscribe to a room nobody has written to yet.
pub(crate) fn room_notify(room: &str) -> Arc<Notify> {
    let mut rooms = ROOMS.lock().unwrap();
    rooms
        .entry(room.to_string())
        .or_insert_with(RoomSignals::new)
        .notify
        .clone()
}

fn write(room: &str, apply: impl FnOnce(&mut RoomSignals)) {
    let mut rooms = ROOMS.lock().unwrap();
    // each writer owns its own direction, so a single map lock is all the
    // coordination the two peers need
    let now = Instant::now();
    rooms.retain(|_, signals| signals.expires_at > now);
    let signals = rooms
        .entry(room.to_string())
        .or_insert_with(RoomSignals::new);
    apply(signals);
    signals.expires_at = now + ROOM_IDLE_TTL;
    signals.notify.notify_waiters();
}

#[cfg(test)]
pub(crate) fn expire_now(room: &str) {
    if let Some(signals) = ROOMS.lock().unwrap().get_mut(room) {
        signals.expires_at = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::types::{IceCandidate, SdpPayload, SignalingRecord};
    use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

    fn record(id: &str, candidates: usize) -> SignalingRecord {
        let sdp = RTCSessionDescription::offer("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n".to_string())
            .expect("test sdp");
        SignalingRecord {
            sdp_payload: SdpPayload {
                sdp,
                id: id.to_string(),
                ts: 0,
            },
            candidates: (0..candidates)
                .map(|i| IceCandidate {
                    candidate: format!("candidate:{} 1 udp 2130706431 127.0.0.1 500{} typ host", i, i),
                    sdp_mid: Some("0".into()),
                    sdp_mline_index: Some(0),
                    connection_id: id.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_absent_room_reads_none() {
        assert!(offer("store-test-missing").is_none());
        assert!(answer("store-test-missing").is_none());
    }

    #[test]
    fn test_offer_overwrites_previous() {
        let room = "store-test-overwrite";
        set_offer(room, record("first", 0));
        set_offer(room, record("second", 1));
        let current = offer(room).expect("offer present");
        assert_eq!(current.sdp_payload.id, "second");
        assert!(answer(room).is_none());
        remove_room(room);
    }

    #[test]
    fn test_republish_keeps_candidate_list_growing() {
        let room = "store-test-monotonic";
        let mut last = 0;
        for n in [0usize, 2, 5] {
            set_answer(room, record("a", n));
            let len = answer(room).unwrap().candidates.len();
            assert!(len >= last, "candidate list shrank: {} -> {}", last, len);
            last = len;
        }
        remove_room(room);
    }

    #[test]
    fn test_idle_rooms_are_swept_on_write() {
        let room = "store-test-idle";
        set_offer(room, record("stale", 0));
        expire_now(room);
        // any write sweeps
        set_offer("store-test-idle-other", record("fresh", 0));
        assert!(offer(room).is_none());
        remove_room("store-test-idle-other");
    }
}
