use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

use super::chunk::{MediaChunk, MediaKind};
use crate::media::{AudioFrame, VideoFrame};

/// Accumulates frames between flushes and frames them as one chunk
pub trait ChunkEncoder: Send + 'static {
    type Frame: Send + 'static;

    fn kind(&self) -> MediaKind;

    /// Content type of the chunks this encoder produces
    fn format(&self) -> String;

    /// Buffer a captured frame
    fn push(&mut self, frame: Self::Frame);

    /// Take everything buffered since the last flush.
    ///
    /// Returns `None` when nothing was captured.
    fn flush(&mut self) -> Result<Option<MediaChunk>>;
}

/// Byte layout of an audio chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioContainer {
    /// Every chunk is a self-contained 16-bit PCM WAV file
    #[default]
    Wav,
    /// Bare little-endian 16-bit PCM
    Pcm,
}

#[derive(Debug, Clone)]
pub struct AudioEncoderConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub container: AudioContainer,
}

impl Default for AudioEncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            container: AudioContainer::Wav,
        }
    }
}

pub struct AudioChunkEncoder {
    config: AudioEncoderConfig,
    buffer: Vec<i16>,
}

impl AudioChunkEncoder {
    pub fn new(config: AudioEncoderConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
        }
    }

    /// Samples buffered since the last flush
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Normalise a frame to the target channel count and sample rate
    fn process_frame(&self, frame: AudioFrame) -> AudioFrame {
        let mut processed = frame;

        // Mix down before resampling so decimation never straddles channels
        if processed.channels != self.config.channels && self.config.channels == 1 {
            processed = to_mono(processed);
        }

        if processed.sample_rate != self.config.sample_rate {
            processed = resample(processed, self.config.sample_rate);
        }

        processed
    }

    fn encode(&self, samples: &[i16]) -> Result<Vec<u8>> {
        match self.config.container {
            AudioContainer::Pcm => Ok(samples.iter().flat_map(|s| s.to_le_bytes()).collect()),
            AudioContainer::Wav => {
                let spec = hound::WavSpec {
                    channels: self.config.channels,
                    sample_rate: self.config.sample_rate,
                    bits_per_sample: 16,
                    sample_format: hound::SampleFormat::Int,
                };

                let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
                {
                    let mut writer = hound::WavWriter::new(&mut cursor, spec)
                        .context("Failed to start WAV chunk")?;
                    for &sample in samples {
                        writer
                            .write_sample(sample)
                            .context("Failed to write sample to WAV")?;
                    }
                    writer.finalize().context("Failed to finalize WAV chunk")?;
                }

                Ok(cursor.into_inner())
            }
        }
    }
}

impl ChunkEncoder for AudioChunkEncoder {
    type Frame = AudioFrame;

    fn kind(&self) -> MediaKind {
        MediaKind::Audio
    }

    fn format(&self) -> String {
        let container = match self.config.container {
            AudioContainer::Wav => "audio/wav",
            AudioContainer::Pcm => "audio/L16",
        };
        format!(
            "{}; rate={}; channels={}",
            container, self.config.sample_rate, self.config.channels
        )
    }

    fn push(&mut self, frame: AudioFrame) {
        let processed = self.process_frame(frame);
        self.buffer.extend_from_slice(&processed.samples);
    }

    fn flush(&mut self) -> Result<Option<MediaChunk>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let samples = std::mem::take(&mut self.buffer);
        let payload = self.encode(&samples)?;
        Ok(Some(MediaChunk::new(MediaKind::Audio, payload)))
    }
}

/// Sum all channels into one (no division, to preserve volume)
fn to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels <= 1 {
        return frame;
    }

    let channels = frame.channels as usize;
    let mono_samples = frame
        .samples
        .chunks_exact(channels)
        .map(|group| {
            let sum: i32 = group.iter().map(|&s| s as i32).sum();
            sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16
        })
        .collect();

    AudioFrame {
        samples: mono_samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Nearest-neighbour resampling of interleaved samples
fn resample(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if frame.sample_rate == target_rate || frame.sample_rate == 0 || target_rate == 0 {
        return frame;
    }

    let channels = frame.channels.max(1) as usize;
    let in_frames = frame.samples.len() / channels;
    let out_frames = (in_frames as u64 * target_rate as u64 / frame.sample_rate as u64) as usize;

    let mut samples = Vec::with_capacity(out_frames * channels);
    for i in 0..out_frames {
        let src = (i as u64 * frame.sample_rate as u64 / target_rate as u64) as usize;
        let start = src.min(in_frames.saturating_sub(1)) * channels;
        samples.extend_from_slice(&frame.samples[start..start + channels]);
    }

    AudioFrame {
        samples,
        sample_rate: target_rate,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    }
}

#[derive(Debug, Clone)]
pub struct VideoEncoderConfig {
    /// Container label forwarded with the stream, e.g. `video/webm; codecs=H264`
    pub mime_type: String,
}

impl Default for VideoEncoderConfig {
    fn default() -> Self {
        Self {
            mime_type: "video/webm; codecs=H264".to_string(),
        }
    }
}

/// Concatenates encoded video packets captured since the last flush
pub struct VideoChunkEncoder {
    config: VideoEncoderConfig,
    buffer: Vec<u8>,
    frames: usize,
}

impl VideoChunkEncoder {
    pub fn new(config: VideoEncoderConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            frames: 0,
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.config.mime_type
    }

    /// Frames buffered since the last flush
    pub fn buffered_frames(&self) -> usize {
        self.frames
    }
}

impl ChunkEncoder for VideoChunkEncoder {
    type Frame = VideoFrame;

    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn format(&self) -> String {
        self.mime_type().to_string()
    }

    fn push(&mut self, frame: VideoFrame) {
        self.buffer.extend_from_slice(&frame.data);
        self.frames += 1;
    }

    fn flush(&mut self) -> Result<Option<MediaChunk>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        debug!(
            "Video chunk: {} frames, {} bytes ({})",
            self.buffered_frames(),
            self.buffer.len(),
            self.config.mime_type
        );
        self.frames = 0;
        let payload = std::mem::take(&mut self.buffer);
        Ok(Some(MediaChunk::new(MediaKind::Video, payload)))
    }
}
