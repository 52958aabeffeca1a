//! Local media: track acquisition and the feed tasks pumping samples into
//! the outgoing tracks.

pub mod source;

mod local;
pub use local::{spawn_feed, AudioInput, LocalMedia, MediaSettings, VideoInput, MIME_TYPE_L16};

use std::fmt;

#[derive(Debug)]
pub enum MediaError {
    /// Device or source not present (no microphone, missing file, capture
    /// backend not compiled in)
    NoDevice(String),
    /// Source opened but failed while producing media
    SourceFailed(String),
    /// Track-level failure from the transport
    Track(webrtc::Error),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::NoDevice(msg) => write!(f, "media source unavailable: {msg}"),
            MediaError::SourceFailed(msg) => write!(f, "media source failed: {msg}"),
            MediaError::Track(e) => write!(f, "track error: {e}"),
        }
    }
}

impl std::error::Error for MediaError {}

impl From<webrtc::Error> for MediaError {
    fn from(err: webrtc::Error) -> Self {
        MediaError::Track(err)
    }
}
