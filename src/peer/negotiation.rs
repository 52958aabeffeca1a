use crate::logger::log;
use crate::peer::state::{
    is_current, LOCAL_CANDIDATES, NEGOTIATION_ATTEMPTS, NEGOTIATION_BACKOFF, PEER,
};
use crate::peer::types::{IceCandidate, Role, SdpPayload, SignalingRecord};
use crate::signaling::store;
use crate::signaling::watch::{watch_room, RoomWatch};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::RTCPeerConnection;

/// Exponential backoff for negotiation steps: 250 ms, 500 ms, 1 s, capped.
fn negotiation_delay(attempt: u32) -> Duration {
    NEGOTIATION_BACKOFF * (1 << attempt.min(4))
}

/// Retries a negotiation step a bounded number of times before the error
/// becomes fatal for the attempt.
async fn with_backoff<T, F, Fut>(what: &str, mut op: F) -> Result<T, webrtc::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, webrtc::Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 < NEGOTIATION_ATTEMPTS => {
                log(&format!(
                    "{what} failed (attempt {}): {e}, backing off",
                    attempt + 1
                ));
                tokio::time::sleep(negotiation_delay(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Remote-side bookkeeping for one attempt. The store replays full
/// records, so the description is set exactly once and each candidate is
/// applied at most once, in arrival order.
struct RemoteApply {
    serialize: tokio::sync::Mutex<()>,
    description_set: AtomicBool,
    seen: Mutex<HashSet<String>>,
}

impl RemoteApply {
    fn new() -> Self {
        Self {
            serialize: tokio::sync::Mutex::new(()),
            description_set: AtomicBool::new(false),
            seen: Mutex::new(HashSet::new()),
        }
    }

    fn description_set(&self) -> bool {
        self.description_set.load(Ordering::SeqCst)
    }

    async fn apply(&self, pc: &Arc<RTCPeerConnection>, record: SignalingRecord, what: &str) {
        let _guard = self.serialize.lock().await;

        if !self.description_set() {
            match pc.set_remote_description(record.sdp_payload.sdp).await {
                Ok(_) => {
                    log(&format!(
                        "Remote {what} set (id {})",
                        record.sdp_payload.id
                    ));
                    self.description_set.store(true, Ordering::SeqCst);
                }
                Err(e) => {
                    // the next replay retries; candidates wait for the
                    // description
                    log(&format!("Failed to set remote {what}: {e}"));
                    return;
                }
            }
        }

        for candidate in record.candidates {
            let fresh = self
                .seen
                .lock()
                .unwrap()
                .insert(candidate.candidate.clone());
            if fresh {
                apply_candidate(pc, candidate).await;
            }
        }
    }
}

/// One candidate is never worth the call: failures are logged and skipped.
async fn apply_candidate(pc: &Arc<RTCPeerConnection>, candidate: IceCandidate) {
    log(&format!("Applying remote candidate: {:?}", candidate));
    let init = RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: None,
    };
    if let Err(e) = pc.add_ice_candidate(init).await {
        log(&format!("Skipping candidate that failed to apply: {e}"));
    }
}

/// Publishes the caller's whole record: current local description plus
/// every candidate discovered so far. Always the full list, so a late
/// subscriber still sees a complete set.
pub async fn republish_local(role: Role, room: &str, generation: u64) {
    if !is_current(generation) {
        return;
    }
    let pc = { PEER.lock().unwrap().as_ref().cloned() };
    let Some(pc) = pc else {
        log("No peer connection to republish for");
        return;
    };
    let Some(sdp) = pc.local_description().await else {
        // candidates discovered before the description is published ride
        // along once it is
        return;
    };
    let candidates = LOCAL_CANDIDATES.lock().unwrap().clone();
    let record = SignalingRecord {
        sdp_payload: SdpPayload {
            sdp,
            id: generation.to_string(),
            ts: chrono::Utc::now().timestamp(),
        },
        candidates,
    };
    match role {
        Role::Interviewer => store::set_offer(room, record),
        Role::Interviewee => store::set_answer(room, record),
    }
}

/// Interviewer side: publish the offer, watch the room for the answer,
/// keep candidates flowing both ways.
pub async fn start_as_initiator(
    pc: Arc<RTCPeerConnection>,
    room: String,
    generation: u64,
) -> Result<RoomWatch, webrtc::Error> {
    log("Creating offer...");
    let pc_op = pc.clone();
    with_backoff("create offer", move || {
        let pc = pc_op.clone();
        async move {
            let offer = pc.create_offer(None).await?;
            pc.set_local_description(offer).await?;
            Ok(())
        }
    })
    .await?;

    // initial publish; the candidate list is usually still empty here
    republish_local(Role::Interviewer, &room, generation).await;

    let remote = Arc::new(RemoteApply::new());
    let watch = {
        let room_log = room.clone();
        watch_room(
            &room,
            |_own_offer| {}, // our own direction
            move |record| {
                if !is_current(generation) {
                    return;
                }
                let pc = pc.clone();
                let remote = remote.clone();
                let room = room_log.clone();
                tokio::spawn(async move {
                    log(&format!("Answer observed for room {room}"));
                    remote.apply(&pc, record, "answer").await;
                });
            },
        )
    };
    Ok(watch)
}

/// Interviewee side: wait for the offer, answer it, keep applying the
/// offer side's late candidates.
pub async fn start_as_responder(
    pc: Arc<RTCPeerConnection>,
    room: String,
    generation: u64,
) -> Result<RoomWatch, webrtc::Error> {
    let remote = Arc::new(RemoteApply::new());
    let answered = Arc::new(AtomicBool::new(false));

    let watch = {
        let room_cb = room.clone();
        watch_room(
            &room,
            move |record| {
                if !is_current(generation) {
                    return;
                }
                let pc = pc.clone();
                let remote = remote.clone();
                let answered = answered.clone();
                let room = room_cb.clone();
                tokio::spawn(async move {
                    respond(pc, room, generation, remote, answered, record).await;
                });
            },
            |_own_answer| {}, // our own direction
        )
    };
    Ok(watch)
}

async fn respond(
    pc: Arc<RTCPeerConnection>,
    room: String,
    generation: u64,
    remote: Arc<RemoteApply>,
    answered: Arc<AtomicBool>,
    record: SignalingRecord,
) {
    remote.apply(&pc, record, "offer").await;
    if !remote.description_set() {
        return;
    }

    // answer exactly once; a failed attempt unlocks the next replay
    if answered.swap(true, Ordering::SeqCst) {
        return;
    }
    log("Creating answer...");
    let pc_op = pc.clone();
    let created = with_backoff("create answer", move || {
        let pc = pc_op.clone();
        async move {
            let answer = pc.create_answer(None).await?;
            pc.set_local_description(answer).await?;
            Ok(())
        }
    })
    .await;

    match created {
        Ok(()) => {
            republish_local(Role::Interviewee, &room, generation).await;
        }
        Err(e) => {
            log(&format!("Answer creation failed: {e}"));
            answered.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::connection::build_api;
    use crate::peer::types::SdpPayload;

    async fn test_pair() -> (Arc<RTCPeerConnection>, Arc<RTCPeerConnection>) {
        let a = Arc::new(
            build_api()
                .unwrap()
                .new_peer_connection(Default::default())
                .await
                .unwrap(),
        );
        let b = Arc::new(
            build_api()
                .unwrap()
                .new_peer_connection(Default::default())
                .await
                .unwrap(),
        );
        (a, b)
    }

    #[test]
    fn test_backoff_delays_double_and_cap() {
        assert_eq!(negotiation_delay(0), Duration::from_millis(250));
        assert_eq!(negotiation_delay(1), Duration::from_millis(500));
        assert_eq!(negotiation_delay(2), Duration::from_millis(1000));
        assert_eq!(negotiation_delay(10), negotiation_delay(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_gives_up_after_bound() {
        let mut count = 0u32;
        let result: Result<(), webrtc::Error> = with_backoff("always fails", || {
            count += 1;
            async { Err(webrtc::Error::ErrConnectionClosed) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(count, NEGOTIATION_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_local_then_remote_description_round() {
        let (a, b) = test_pair().await;
        // an m-line must exist for the exchange to be meaningful
        let _dc = a.create_data_channel("probe", None).await.unwrap();

        let offer = a.create_offer(None).await.unwrap();
        a.set_local_description(offer.clone()).await.unwrap();
        b.set_remote_description(offer).await.unwrap();

        let answer = b.create_answer(None).await.unwrap();
        b.set_local_description(answer.clone()).await.unwrap();
        a.set_remote_description(answer).await.unwrap();

        let _ = a.close().await;
        let _ = b.close().await;
    }

    #[tokio::test]
    async fn test_malformed_candidate_is_skipped_not_fatal() {
        let (a, b) = test_pair().await;
        let _dc = a.create_data_channel("probe", None).await.unwrap();
        let offer = a.create_offer(None).await.unwrap();
        a.set_local_description(offer.clone()).await.unwrap();

        let remote = RemoteApply::new();
        let record = SignalingRecord {
            sdp_payload: SdpPayload {
                sdp: offer,
                id: "1".into(),
                ts: 0,
            },
            candidates: vec![IceCandidate {
                candidate: "definitely not a candidate line".into(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
                connection_id: "1".into(),
            }],
        };

        // applied twice: second replay must dedupe, first must survive the
        // malformed candidate
        remote.apply(&b, record.clone(), "offer").await;
        remote.apply(&b, record, "offer").await;
        assert!(remote.description_set());
        assert_eq!(remote.seen.lock().unwrap().len(), 1);

        let _ = a.close().await;
        let _ = b.close().await;
    }
}
