use std::time::Duration;

use crate::media::MediaConstraints;
use crate::recorder::{AudioEncoderConfig, VideoEncoderConfig};

/// Configuration for an interview session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier, used in logs
    pub session_id: String,

    /// Device constraints passed to the capture backend
    pub constraints: MediaConstraints,

    /// Audio chunk framing (sample rate, channels, container)
    pub audio: AudioEncoderConfig,

    /// Video chunk framing
    pub video: VideoEncoderConfig,

    /// Flush cadence of the audio recorder
    /// Default: 500ms
    pub audio_timeslice: Duration,

    /// Flush cadence of the video recorder
    /// Default: 500ms
    pub video_timeslice: Duration,

    /// Delay between starting a chat turn's audio and showing its text
    /// Default: 750ms
    pub text_delay: Duration,

    /// Responding-status message meaning "control handed over normally"
    pub success_sentinel: String,

    /// Upper bound for each teardown step (recorder flush, device release, channel close)
    pub stop_timeout: Duration,

    /// Chunks buffered between the recorders and the session loop
    pub chunk_queue: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("interview-{}", uuid::Uuid::new_v4()),
            constraints: MediaConstraints::default(),
            audio: AudioEncoderConfig::default(),
            video: VideoEncoderConfig::default(),
            audio_timeslice: Duration::from_millis(500),
            video_timeslice: Duration::from_millis(500),
            text_delay: Duration::from_millis(750),
            success_sentinel: "Success".to_string(),
            stop_timeout: Duration::from_secs(2),
            chunk_queue: 32,
        }
    }
}
