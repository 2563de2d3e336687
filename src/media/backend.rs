use anyhow::{bail, Result};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Encoded video data as delivered by the camera pipeline
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Encoded bytes (container/codec is decided by the device)
    pub data: Vec<u8>,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Microphone constraints
#[derive(Debug, Clone)]
pub struct AudioConstraints {
    /// Target sample rate (the recorder resamples if the device differs)
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channels: u16,
    /// Samples per device buffer
    pub buffer_size: usize,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            buffer_size: 16384,
        }
    }
}

/// Camera constraints
#[derive(Debug, Clone)]
pub struct VideoConstraints {
    pub ideal_frame_rate: u32,
    pub min_frame_rate: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            ideal_frame_rate: 30,
            min_frame_rate: 24,
        }
    }
}

impl VideoConstraints {
    /// Rate a source should deliver: the ideal rate, never below the minimum
    pub fn frame_rate(&self) -> u32 {
        self.ideal_frame_rate.max(self.min_frame_rate).max(1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MediaConstraints {
    pub audio: AudioConstraints,
    pub video: VideoConstraints,
}

/// Live device streams handed out by a capture backend.
///
/// The two streams are independent: a recorder consumes each one and there is
/// no ordering relationship between audio and video frames.
pub struct MediaStream {
    pub audio: mpsc::Receiver<AudioFrame>,
    pub video: mpsc::Receiver<VideoFrame>,
}

/// Media capture backend trait
///
/// Implementations:
/// - File: replay a WAV file (and optionally an encoded video file) in real time
/// - Devices: camera + microphone, provided by a platform shim outside this crate
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Acquire the devices and start capturing
    ///
    /// Fails when a device is denied or unavailable. A stream that later ends
    /// (receiver returns `None`) means the device went away.
    async fn acquire(&mut self, constraints: &MediaConstraints) -> Result<MediaStream>;

    /// Release the devices
    async fn release(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Capture source type
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// Camera + microphone
    Devices,
    /// Replay from files (for testing/headless runs)
    File {
        audio: PathBuf,
        video: Option<PathBuf>,
    },
}

/// Capture backend factory
pub struct CaptureFactory;

impl CaptureFactory {
    /// Create a capture backend for the given source
    pub fn create(source: CaptureSource) -> Result<Box<dyn CaptureBackend>> {
        match source {
            CaptureSource::File { audio, video } => {
                let backend = super::file::FileCaptureBackend::new(audio, video);
                Ok(Box::new(backend))
            }
            CaptureSource::Devices => {
                bail!("Camera/microphone capture needs a platform backend; use a file source")
            }
        }
    }
}
