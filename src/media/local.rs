use crate::logger::log;
use crate::media::source::{self, SampleSource};
use crate::media::MediaError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use webrtc::api::media_engine::MIME_TYPE_H264;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Uncompressed 16-bit PCM, network byte order (RFC 3551). Both ends of a
/// call run this app, so the custom capability always matches.
pub const MIME_TYPE_L16: &str = "audio/L16";

const STREAM_ID: &str = "mockmate";

/// Where the outgoing audio track draws its media from.
#[derive(Debug, Clone)]
pub enum AudioInput {
    Microphone,
    Silence,
}

/// Where the outgoing video track draws its media from.
#[derive(Debug, Clone)]
pub enum VideoInput {
    /// Annex-B H.264 recording replayed as the camera
    Prerecorded(PathBuf),
    /// Negotiate the video line but send no frames
    Idle,
}

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub audio: AudioInput,
    pub video: VideoInput,
    /// Source swapped in when screen sharing starts
    pub screen: Option<PathBuf>,
}

impl Default for MediaSettings {
    fn default() -> Self {
        // camera and screen content come from recordings in capture-less
        // builds; both knobs are optional
        let video = std::env::var("MOCKMATE_CAMERA_FILE")
            .map(|p| VideoInput::Prerecorded(PathBuf::from(p)))
            .unwrap_or(VideoInput::Idle);
        let screen = std::env::var("MOCKMATE_SCREEN_FILE")
            .ok()
            .map(PathBuf::from);
        Self {
            audio: if cfg!(feature = "mic-capture") {
                AudioInput::Microphone
            } else {
                AudioInput::Silence
            },
            video,
            screen,
        }
    }
}

/// Local camera + microphone of one call attempt: the two outgoing tracks
/// plus the feed tasks writing into them. Owned by exactly one attempt;
/// `stop` ends every feed before a retry acquires fresh media.
pub struct LocalMedia {
    pub audio_track: Arc<TrackLocalStaticSample>,
    pub video_track: Arc<TrackLocalStaticSample>,
    audio_enabled: Arc<AtomicBool>,
    video_enabled: Arc<AtomicBool>,
    feeds: Mutex<Vec<tauri::async_runtime::JoinHandle<()>>>,
}

impl LocalMedia {
    /// Opens the configured sources and starts feeding the local tracks.
    /// Fails without retrying; the session controller surfaces the error.
    pub fn acquire(settings: &MediaSettings) -> Result<Arc<Self>, MediaError> {
        let audio_source: Box<dyn SampleSource> = match &settings.audio {
            AudioInput::Silence => Box::new(source::SilentAudio::new()),
            #[cfg(feature = "mic-capture")]
            AudioInput::Microphone => Box::new(source::MicrophoneSource::open()?),
            #[cfg(not(feature = "mic-capture"))]
            AudioInput::Microphone => {
                return Err(MediaError::NoDevice(
                    "microphone capture is not compiled into this build".into(),
                ))
            }
        };
        let video_source: Option<Box<dyn SampleSource>> = match &settings.video {
            VideoInput::Prerecorded(path) => Some(Box::new(source::H264FileSource::open(path)?)),
            VideoInput::Idle => None,
        };

        let audio_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_L16.to_owned(),
                clock_rate: source::AUDIO_SAMPLE_RATE,
                channels: source::AUDIO_CHANNELS,
                ..Default::default()
            },
            "audio".to_owned(),
            STREAM_ID.to_owned(),
        ));
        let video_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                clock_rate: 90_000,
                ..Default::default()
            },
            "video".to_owned(),
            STREAM_ID.to_owned(),
        ));

        let audio_enabled = Arc::new(AtomicBool::new(true));
        let video_enabled = Arc::new(AtomicBool::new(true));

        let mut feeds = vec![spawn_feed(
            audio_track.clone(),
            audio_source,
            audio_enabled.clone(),
            None,
        )];
        if let Some(src) = video_source {
            feeds.push(spawn_feed(
                video_track.clone(),
                src,
                video_enabled.clone(),
                None,
            ));
        }

        log("Local media acquired");
        Ok(Arc::new(Self {
            audio_track,
            video_track,
            audio_enabled,
            video_enabled,
            feeds: Mutex::new(feeds),
        }))
    }

    /// Flips the outgoing audio on or off. Pure track-level mute, nothing
    /// is renegotiated.
    pub fn toggle_audio(&self) -> bool {
        let on = !self.audio_enabled.load(Ordering::Relaxed);
        self.audio_enabled.store(on, Ordering::Relaxed);
        log(&format!("Microphone enabled: {on}"));
        on
    }

    pub fn toggle_video(&self) -> bool {
        let on = !self.video_enabled.load(Ordering::Relaxed);
        self.video_enabled.store(on, Ordering::Relaxed);
        log(&format!("Camera enabled: {on}"));
        on
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::Relaxed)
    }

    pub fn video_enabled(&self) -> bool {
        self.video_enabled.load(Ordering::Relaxed)
    }

    /// Ends every feed. After this no task of the attempt writes media.
    pub fn stop(&self) {
        for feed in self.feeds.lock().unwrap().drain(..) {
            feed.abort();
        }
    }

    pub fn active_feeds(&self) -> usize {
        self.feeds.lock().unwrap().len()
    }
}

/// Pumps a sample source into a local track at the source's own cadence.
/// Disabled tracks keep their feed alive but skip the writes. `on_ended`
/// runs only when the source drains by itself (screen share revert hangs
/// off this).
pub fn spawn_feed(
    track: Arc<TrackLocalStaticSample>,
    mut src: Box<dyn SampleSource>,
    enabled: Arc<AtomicBool>,
    on_ended: Option<Box<dyn FnOnce() + Send>>,
) -> tauri::async_runtime::JoinHandle<()> {
    tauri::async_runtime::spawn(async move {
        loop {
            match src.next_chunk() {
                Ok(Some(chunk)) => {
                    if enabled.load(Ordering::Relaxed) {
                        let sample = Sample {
                            data: chunk.data,
                            duration: chunk.duration,
                            ..Default::default()
                        };
                        if let Err(e) = track.write_sample(&sample).await {
                            log(&format!("write_sample failed, feed stops: {e}"));
                            return;
                        }
                    }
                    tokio::time::sleep(chunk.duration).await;
                }
                Ok(None) => break,
                Err(e) => {
                    log(&format!("media source error, feed stops: {e}"));
                    break;
                }
            }
        }
        if let Some(hook) = on_ended {
            hook();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_settings() -> MediaSettings {
        MediaSettings {
            audio: AudioInput::Silence,
            video: VideoInput::Idle,
            screen: None,
        }
    }

    #[tokio::test]
    async fn test_acquire_starts_enabled() {
        let media = LocalMedia::acquire(&idle_settings()).unwrap();
        assert!(media.audio_enabled());
        assert!(media.video_enabled());
        assert_eq!(media.active_feeds(), 1); // idle video has no feed
        media.stop();
    }

    #[tokio::test]
    async fn test_toggles_flip_without_touching_feeds() {
        let media = LocalMedia::acquire(&idle_settings()).unwrap();
        assert!(!media.toggle_audio());
        assert!(media.toggle_audio());
        assert!(!media.toggle_video());
        let feeds_before = media.active_feeds();
        media.toggle_video();
        assert_eq!(media.active_feeds(), feeds_before);
        media.stop();
    }

    #[tokio::test]
    async fn test_stop_ends_every_feed() {
        let media = LocalMedia::acquire(&idle_settings()).unwrap();
        media.stop();
        assert_eq!(media.active_feeds(), 0);
    }

    #[tokio::test]
    async fn test_missing_video_file_fails_acquisition() {
        let settings = MediaSettings {
            audio: AudioInput::Silence,
            video: VideoInput::Prerecorded("/nonexistent/camera.h264".into()),
            screen: None,
        };
        assert!(LocalMedia::acquire(&settings).is_err());
    }

    #[tokio::test]
    async fn test_on_ended_hook_fires_when_source_drains() {
        struct TwoChunks(u8);
        impl crate::media::source::SampleSource for TwoChunks {
            fn next_chunk(
                &mut self,
            ) -> Result<Option<crate::media::source::MediaChunk>, MediaError> {
                if self.0 == 0 {
                    return Ok(None);
                }
                self.0 -= 1;
                Ok(Some(crate::media::source::MediaChunk {
                    data: bytes::Bytes::from_static(&[0u8; 4]),
                    duration: std::time::Duration::from_millis(1),
                }))
            }
        }

        let track = Arc::new(TrackLocalStaticSample::new(
            webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                clock_rate: 90_000,
                ..Default::default()
            },
            "video".to_owned(),
            "test".to_owned(),
        ));
        let (tx, rx) = std::sync::mpsc::channel();
        let feed = spawn_feed(
            track,
            Box::new(TwoChunks(2)),
            Arc::new(AtomicBool::new(true)),
            Some(Box::new(move || {
                let _ = tx.send(());
            })),
        );
        rx.recv_timeout(std::time::Duration::from_secs(2))
            .expect("end hook fired");
        drop(feed);
    }
}
