use crate::logger::{emit_chat, emit_disconnected, log};
use crate::peer::state::DATA_CH;
use crate::peer::types::ChatMessage;
use crate::session;
use std::sync::Arc;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;

/// Shared wiring for the side channel, used by both roles. The channel
/// carries plaintext JSON chat messages; the first one is a presence line
/// with the sender's display name.
pub fn attach_dc(dc: &Arc<RTCDataChannel>) {
    log("attach_dc called");

    *DATA_CH.lock().unwrap() = Some(dc.clone());

    dc.on_open(Box::new({
        let dc = dc.clone();
        move || {
            log("Chat channel opened, announcing presence");
            tauri::async_runtime::spawn({
                let dc = dc.clone();
                async move {
                    let name = session::current()
                        .map(|(_, name, _)| name)
                        .unwrap_or_else(|| "Guest".into());
                    let hello = ChatMessage {
                        from: name,
                        body: "has joined the interview".into(),
                        ts: chrono::Utc::now().timestamp(),
                    };
                    match serde_json::to_string(&hello) {
                        Ok(json) => {
                            let sent = dc.send_text(json).await.is_ok();
                            log(&format!("Presence hello sent: {}", sent));
                        }
                        Err(e) => log(&format!("Failed to encode hello: {:?}", e)),
                    }
                }
            });
            Box::pin(async {})
        }
    }));

    dc.on_message(Box::new(|msg: DataChannelMessage| {
        match serde_json::from_slice::<ChatMessage>(&msg.data) {
            Ok(chat) => {
                log(&format!("Chat from {}: {} bytes", chat.from, chat.body.len()));
                emit_chat(&chat);
            }
            Err(e) => {
                // unknown payloads are dropped, never fatal
                log(&format!("Ignoring unparseable channel message: {:?}", e));
            }
        }
        Box::pin(async {})
    }));

    dc.on_close(Box::new(|| {
        log("Chat channel closed - emitting disconnected");
        emit_disconnected();
        Box::pin(async {})
    }));
}

/// Sends one chat line from the local participant
pub async fn send_chat(body: String) -> bool {
    let dc = { DATA_CH.lock().unwrap().as_ref().cloned() };
    let Some(dc) = dc else {
        log("No chat channel available for sending");
        return false;
    };

    let from = session::current()
        .map(|(_, name, _)| name)
        .unwrap_or_else(|| "Guest".into());
    let msg = ChatMessage {
        from,
        body,
        ts: chrono::Utc::now().timestamp(),
    };
    match serde_json::to_string(&msg) {
        Ok(json) => {
            let sent = dc.send_text(json).await.is_ok();
            log(&format!("Chat send result: {}", sent));
            sent
        }
        Err(e) => {
            log(&format!("Failed to encode chat message: {:?}", e));
            false
        }
    }
}
