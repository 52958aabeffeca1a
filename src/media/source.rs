use crate::logger::log;
use crate::media::MediaError;
use bytes::Bytes;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use webrtc::media::io::h264_reader::H264Reader;

pub const AUDIO_SAMPLE_RATE: u32 = 48_000;
pub const AUDIO_CHANNELS: u16 = 2;
/// One audio chunk = 20 ms of PCM
pub const AUDIO_FRAME: Duration = Duration::from_millis(20);

const VIDEO_FPS: u32 = 30;
const NAL_BUFFER_CAPACITY: usize = 1_048_576;

/// One timed chunk of media ready to be written to a local track.
pub struct MediaChunk {
    pub data: Bytes,
    pub duration: Duration,
}

/// Pull source behind a local track's feed task. `Ok(None)` means the
/// source ended on its own (file drained, capture stopped by the user).
pub trait SampleSource: Send {
    fn next_chunk(&mut self) -> Result<Option<MediaChunk>, MediaError>;
}

/// 20 ms chunks of silent 48 kHz stereo PCM (`audio/L16`). Stands in for
/// the microphone when capture is not compiled in; also the test source.
pub struct SilentAudio {
    frame: Bytes,
}

impl SilentAudio {
    pub fn new() -> Self {
        let samples_per_frame =
            AUDIO_SAMPLE_RATE as usize / 50 * AUDIO_CHANNELS as usize;
        Self {
            frame: Bytes::from(vec![0u8; samples_per_frame * 2]),
        }
    }
}

impl SampleSource for SilentAudio {
    fn next_chunk(&mut self) -> Result<Option<MediaChunk>, MediaError> {
        Ok(Some(MediaChunk {
            data: self.frame.clone(),
            duration: AUDIO_FRAME,
        }))
    }
}

/// Annex-B H.264 file replayed at a fixed frame rate, one NAL per sample.
/// Used for the camera track in capture-less builds and as the screen
/// share source.
pub struct H264FileSource {
    reader: H264Reader<BufReader<File>>,
    emitted: bool,
}

impl H264FileSource {
    pub fn open(path: &Path) -> Result<Self, MediaError> {
        let file = File::open(path).map_err(|e| {
            MediaError::NoDevice(format!("could not open {}: {}", path.display(), e))
        })?;
        Ok(Self {
            reader: H264Reader::new(BufReader::new(file), NAL_BUFFER_CAPACITY),
            emitted: false,
        })
    }
}

impl SampleSource for H264FileSource {
    fn next_chunk(&mut self) -> Result<Option<MediaChunk>, MediaError> {
        match self.reader.next_nal() {
            Ok(nal) => {
                self.emitted = true;
                Ok(Some(MediaChunk {
                    data: nal.data.freeze(),
                    duration: Duration::from_secs(1) / VIDEO_FPS,
                }))
            }
            Err(err) if self.emitted => {
                // EOF and broken tails both end the source; neither takes
                // the call down
                log(&format!("H264 source drained: {err}"));
                Ok(None)
            }
            Err(err) => Err(MediaError::SourceFailed(format!(
                "no frames could be read: {err}"
            ))),
        }
    }
}

/// Microphone capture via cpal, converted to 48 kHz stereo L16 chunks.
#[cfg(feature = "mic-capture")]
pub use mic::MicrophoneSource;

#[cfg(feature = "mic-capture")]
mod mic {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, SampleRate};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender};
    use std::sync::Arc;

    pub struct MicrophoneSource {
        rx: Receiver<Bytes>,
        stop: Arc<AtomicBool>,
    }

    impl MicrophoneSource {
        pub fn open() -> Result<Self, MediaError> {
            let (chunk_tx, chunk_rx) = std::sync::mpsc::sync_channel::<Bytes>(32);
            let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), MediaError>>();
            let stop = Arc::new(AtomicBool::new(false));
            let stop_flag = stop.clone();

            // cpal streams are !Send, so the stream lives on its own thread
            std::thread::spawn(move || {
                match build_stream(chunk_tx) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        while !stop_flag.load(Ordering::Relaxed) {
                            std::thread::park_timeout(Duration::from_millis(200));
                        }
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            });

            match ready_rx.recv() {
                Ok(Ok(())) => Ok(Self { rx: chunk_rx, stop }),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(MediaError::NoDevice("capture thread died".into())),
            }
        }
    }

    fn build_stream(tx: SyncSender<Bytes>) -> Result<cpal::Stream, MediaError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| MediaError::NoDevice("no input device".into()))?;

        let range = device
            .supported_input_configs()
            .map_err(|e| MediaError::NoDevice(format!("input configs: {e}")))?
            .find(|r| {
                r.min_sample_rate().0 <= AUDIO_SAMPLE_RATE
                    && AUDIO_SAMPLE_RATE <= r.max_sample_rate().0
                    && matches!(r.sample_format(), SampleFormat::F32 | SampleFormat::I16)
            })
            .ok_or_else(|| MediaError::NoDevice("no 48 kHz input config".into()))?;

        let format = range.sample_format();
        let supported = range.with_sample_rate(SampleRate(AUDIO_SAMPLE_RATE));
        let channels = supported.channels() as usize;
        let config = supported.config();

        let mut pending: Vec<i16> = Vec::new();
        let frame_samples =
            AUDIO_SAMPLE_RATE as usize / 50 * AUDIO_CHANNELS as usize;

        let mut push = move |interleaved: Vec<i16>| {
            pending.extend(to_stereo(&interleaved, channels));
            while pending.len() >= frame_samples {
                let rest = pending.split_off(frame_samples);
                let frame = std::mem::replace(&mut pending, rest);
                let mut bytes = Vec::with_capacity(frame.len() * 2);
                for s in frame {
                    bytes.extend_from_slice(&s.to_be_bytes()); // L16 is network order
                }
                // drop chunks when the feed falls behind
                let _ = tx.try_send(Bytes::from(bytes));
            }
        };

        let err_cb = |e| log(&format!("microphone stream error: {e}"));
        let stream = match format {
            SampleFormat::F32 => device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _| {
                        push(
                            data.iter()
                                .map(|s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                                .collect(),
                        )
                    },
                    err_cb,
                    None,
                )
                .map_err(|e| MediaError::NoDevice(format!("build stream: {e}")))?,
            SampleFormat::I16 => device
                .build_input_stream(
                    &config,
                    move |data: &[i16], _| push(data.to_vec()),
                    err_cb,
                    None,
                )
                .map_err(|e| MediaError::NoDevice(format!("build stream: {e}")))?,
            other => {
                return Err(MediaError::NoDevice(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        };
        stream
            .play()
            .map_err(|e| MediaError::SourceFailed(format!("start stream: {e}")))?;
        Ok(stream)
    }

    fn to_stereo(interleaved: &[i16], channels: usize) -> Vec<i16> {
        match channels {
            0 => Vec::new(),
            1 => interleaved.iter().flat_map(|&s| [s, s]).collect(),
            n => interleaved
                .chunks(n)
                .flat_map(|frame| [frame[0], frame[1.min(frame.len() - 1)]])
                .collect(),
        }
    }

    impl SampleSource for MicrophoneSource {
        fn next_chunk(&mut self) -> Result<Option<MediaChunk>, MediaError> {
            match self.rx.recv_timeout(Duration::from_secs(2)) {
                Ok(data) => Ok(Some(MediaChunk {
                    data,
                    duration: AUDIO_FRAME,
                })),
                Err(RecvTimeoutError::Timeout) => {
                    log("microphone went quiet, ending source");
                    Ok(None)
                }
                Err(RecvTimeoutError::Disconnected) => Ok(None),
            }
        }
    }

    impl Drop for MicrophoneSource {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_audio_chunk_size() {
        let mut src = SilentAudio::new();
        let chunk = src.next_chunk().unwrap().expect("silence never ends");
        // 20 ms of 48 kHz stereo 16-bit PCM
        assert_eq!(chunk.data.len(), 48_000 / 50 * 2 * 2);
        assert_eq!(chunk.duration, AUDIO_FRAME);
        assert!(chunk.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_h264_source_missing_file() {
        let err = H264FileSource::open(Path::new("/nonexistent/clip.h264"))
            .err()
            .expect("missing file must fail acquisition");
        assert!(matches!(err, MediaError::NoDevice(_)));
    }
}
