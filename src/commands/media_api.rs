use crate::logger::{emit_screen_share, log};
use crate::media::source::H264FileSource;
use crate::media::{spawn_feed, MediaSettings};
use crate::peer::state::{
    current_generation, is_current, ScreenShare, LOCAL_MEDIA, SCREEN_SHARE, VIDEO_SENDER,
};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tauri::command;
use webrtc::api::media_engine::MIME_TYPE_H264;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Mute/unmute; returns the new enabled state. Track-level only, the
/// transport is not touched.
#[command]
pub fn toggle_microphone() -> bool {
    match LOCAL_MEDIA.lock().unwrap().as_ref() {
        Some(media) => media.toggle_audio(),
        None => {
            log("toggle_microphone with no local media");
            false
        }
    }
}

/// Camera on/off; returns the new enabled state
#[command]
pub fn toggle_camera() -> bool {
    match LOCAL_MEDIA.lock().unwrap().as_ref() {
        Some(media) => media.toggle_video(),
        None => {
            log("toggle_camera with no local media");
            false
        }
    }
}

/// Swaps the outgoing video to a screen source in place: same sender, no
/// renegotiation, chat channel untouched. Reverts to the camera by itself
/// when the source ends.
#[command]
pub async fn start_screen_share(source: Option<String>) -> bool {
    if SCREEN_SHARE.lock().unwrap().is_some() {
        log("Screen share already active");
        return false;
    }
    let sender = { VIDEO_SENDER.lock().unwrap().as_ref().cloned() };
    let Some(sender) = sender else {
        log("start_screen_share with no video sender");
        return false;
    };

    let Some(path) = source.map(PathBuf::from).or_else(default_screen_source) else {
        log("No screen source configured");
        return false;
    };
    let src = match H264FileSource::open(&path) {
        Ok(src) => src,
        Err(e) => {
            log(&format!("Screen source failed to open: {e}"));
            return false;
        }
    };

    let track = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_H264.to_owned(),
            clock_rate: 90_000,
            ..Default::default()
        },
        "screen".to_owned(),
        "mockmate".to_owned(),
    ));
    if let Err(e) = sender
        .replace_track(Some(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>))
        .await
    {
        log(&format!("replace_track failed: {e}"));
        return false;
    }

    let generation = current_generation();
    let feed = spawn_feed(
        track.clone(),
        Box::new(src),
        Arc::new(AtomicBool::new(true)),
        Some(Box::new(move || {
            // the source drained on its own: put the camera back
            tauri::async_runtime::spawn(async move {
                finish_screen_share(generation).await;
            });
        })),
    );
    *SCREEN_SHARE.lock().unwrap() = Some(ScreenShare { track, feed });
    emit_screen_share(true);
    true
}

/// Manual stop: end the screen feed and put the camera track back
#[command]
pub async fn stop_screen_share() -> bool {
    let share = SCREEN_SHARE.lock().unwrap().take();
    let Some(share) = share else {
        log("stop_screen_share with no active share");
        return false;
    };
    log(&format!("Stopping screen share track '{}'", share.track.id()));
    share.feed.abort();
    restore_camera().await
}

async fn finish_screen_share(generation: u64) {
    if !is_current(generation) {
        return; // the attempt that owned this share is gone
    }
    if SCREEN_SHARE.lock().unwrap().take().is_none() {
        return; // already stopped manually
    }
    restore_camera().await;
}

async fn restore_camera() -> bool {
    let media = { LOCAL_MEDIA.lock().unwrap().as_ref().cloned() };
    let sender = { VIDEO_SENDER.lock().unwrap().as_ref().cloned() };
    match (media, sender) {
        (Some(media), Some(sender)) => match sender
            .replace_track(Some(
                Arc::clone(&media.video_track) as Arc<dyn TrackLocal + Send + Sync>
            ))
            .await
        {
            Ok(_) => {
                log("Camera track restored");
                emit_screen_share(false);
                true
            }
            Err(e) => {
                log(&format!("Failed to restore camera track: {e}"));
                false
            }
        },
        _ => {
            log("No camera track to restore");
            false
        }
    }
}

fn default_screen_source() -> Option<PathBuf> {
    MediaSettings::default().screen
}
