use crate::logger::{emit_connecting, emit_disconnected, emit_error, log};
use crate::media::{LocalMedia, MediaSettings};
use crate::peer::connection::new_peer;
use crate::peer::negotiation;
use crate::peer::state::{
    is_current, next_generation, APP, DATA_CH, LOCAL_CANDIDATES, LOCAL_MEDIA, PEER, ROOM_WATCH,
    SCREEN_SHARE, VIDEO_SENDER, WAS_CONNECTED,
};
use crate::peer::types::Role;
use crate::session::{CallSession, SESSION};
use crate::utils::random_room_id;
use tauri::{command, AppHandle};

/// Fresh room id for a scheduled interview
#[command]
pub fn create_room() -> String {
    random_room_id()
}

/// Joins a room: acquire media, build the peer, run this role's side of
/// the negotiation. Every failure surfaces as one error message.
#[command]
pub async fn join_interview(
    app: AppHandle,
    room: String,
    display_name: String,
    role: Role,
) -> bool {
    *APP.lock().unwrap() = Some(app);
    start_call(room, display_name, role).await
}

/// Leaves the call and releases camera, channel, and connection
#[command]
pub async fn leave_interview() {
    next_generation(); // invalidate in-flight callbacks of the old attempt
    teardown().await;
    if let Some(session) = SESSION.lock().unwrap().take() {
        crate::signaling::store::remove_room(&session.room);
    }
    emit_disconnected();
}

/// Manual retry: tear the attempt down completely, then start over with a
/// fresh candidate accumulator
#[command]
pub async fn reconnect(app: AppHandle) -> bool {
    *APP.lock().unwrap() = Some(app);
    let Some((room, name, role)) = crate::session::current() else {
        log("reconnect called with no active session");
        return false;
    };
    start_call(room, name, role).await
}

async fn start_call(room: String, display_name: String, role: Role) -> bool {
    let generation = next_generation();
    log(&format!(
        "Starting attempt {generation} for room {room} as {role:?}"
    ));

    // the prior attempt must be fully gone before new media is acquired
    teardown().await;

    *SESSION.lock().unwrap() = Some(CallSession {
        room: room.clone(),
        display_name,
        role,
    });
    emit_connecting();

    // media first: the offer must already carry the local tracks
    let media = match LocalMedia::acquire(&MediaSettings::default()) {
        Ok(media) => media,
        Err(e) => {
            log(&format!("Media acquisition failed: {e}"));
            emit_error("Could not access camera or microphone");
            return false;
        }
    };
    if !is_current(generation) {
        media.stop();
        return false;
    }
    *LOCAL_MEDIA.lock().unwrap() = Some(media.clone());

    let pc = match new_peer(role, room.clone(), generation, &media).await {
        Ok(pc) => pc,
        Err(e) => {
            log(&format!("Peer construction failed: {e}"));
            emit_error("Could not create the call connection");
            return false;
        }
    };
    if !is_current(generation) {
        let _ = pc.close().await;
        return false;
    }
    *PEER.lock().unwrap() = Some(pc.clone());

    let watch = if role.is_initiator() {
        negotiation::start_as_initiator(pc, room.clone(), generation).await
    } else {
        negotiation::start_as_responder(pc, room.clone(), generation).await
    };
    match watch {
        Ok(watch) => {
            if !is_current(generation) {
                // superseded while negotiating; the newer attempt owns the
                // globals now
                watch.cancel();
                return false;
            }
            *ROOM_WATCH.lock().unwrap() = Some(watch);
            true
        }
        Err(e) => {
            log(&format!("Negotiation failed: {e}"));
            emit_error("Could not negotiate the call");
            false
        }
    }
}

/// Stops everything the current attempt owns: watch task, screen share,
/// media feeds, chat channel, peer connection, accumulated candidates.
pub(crate) async fn teardown() {
    if let Some(watch) = ROOM_WATCH.lock().unwrap().take() {
        watch.cancel();
    }
    if let Some(share) = SCREEN_SHARE.lock().unwrap().take() {
        share.feed.abort();
    }
    *VIDEO_SENDER.lock().unwrap() = None;

    // feeds end before the devices are handed to the next attempt
    if let Some(media) = LOCAL_MEDIA.lock().unwrap().take() {
        media.stop();
    }

    let dc = DATA_CH.lock().unwrap().take();
    if let Some(dc) = dc {
        let _ = dc.close().await;
    }

    let pc = PEER.lock().unwrap().take();
    if let Some(pc) = pc {
        let _ = pc.close().await;
    }

    LOCAL_CANDIDATES.lock().unwrap().clear();
    *WAS_CONNECTED.lock().unwrap() = false;
}
