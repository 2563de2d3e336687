use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioFrame, CaptureBackend, MediaConstraints, MediaStream, VideoFrame};

/// Bytes per replayed video packet; the file is an opaque encoded stream
const VIDEO_PACKET_BYTES: usize = 4096;

const FRAME_QUEUE: usize = 64;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            bail!(
                "Unsupported WAV format: {} bits {:?} (expected 16-bit PCM)",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Replays media files in real time as if they were live devices
pub struct FileCaptureBackend {
    audio_path: PathBuf,
    video_path: Option<PathBuf>,
    tasks: Vec<JoinHandle<()>>,
    capturing: bool,
}

impl FileCaptureBackend {
    pub fn new(audio_path: PathBuf, video_path: Option<PathBuf>) -> Self {
        Self {
            audio_path,
            video_path,
            tasks: Vec::new(),
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FileCaptureBackend {
    async fn acquire(&mut self, constraints: &MediaConstraints) -> Result<MediaStream> {
        if self.capturing {
            bail!("Already capturing");
        }

        let audio_path = self.audio_path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(audio_path))
            .await
            .context("Audio file loader panicked")??;

        let video = match &self.video_path {
            Some(path) => Some(
                tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to open video file: {}", path.display()))?,
            ),
            None => None,
        };

        let (audio_tx, audio_rx) = mpsc::channel(FRAME_QUEUE);
        let (video_tx, video_rx) = mpsc::channel(FRAME_QUEUE);

        let buffer_size = constraints.audio.buffer_size.max(1);
        self.tasks.push(tokio::spawn(replay_audio(audio, buffer_size, audio_tx)));

        // Without a video file the sender is dropped and the video stream ends at once
        if let Some(bytes) = video {
            let fps = constraints.video.frame_rate();
            self.tasks.push(tokio::spawn(replay_video(bytes, fps, video_tx)));
        }

        self.capturing = true;
        info!("File capture started: {}", self.audio_path.display());

        Ok(MediaStream {
            audio: audio_rx,
            video: video_rx,
        })
    }

    async fn release(&mut self) -> Result<()> {
        if !self.capturing {
            return Ok(());
        }

        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.capturing = false;

        info!("File capture released");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "file"
    }
}

async fn replay_audio(audio: AudioFile, buffer_size: usize, tx: mpsc::Sender<AudioFrame>) {
    let channels = audio.channels.max(1);
    let frame_len = buffer_size * channels as usize;
    let period = Duration::from_micros(buffer_size as u64 * 1_000_000 / audio.sample_rate.max(1) as u64);
    let mut ticker = tokio::time::interval(period);

    for (index, samples) in audio.samples.chunks(frame_len).enumerate() {
        ticker.tick().await;

        let frame = AudioFrame {
            samples: samples.to_vec(),
            sample_rate: audio.sample_rate,
            channels,
            timestamp_ms: index as u64 * period.as_millis() as u64,
        };

        if tx.send(frame).await.is_err() {
            debug!("Audio consumer went away");
            return;
        }
    }

    debug!("Audio file exhausted");
}

async fn replay_video(bytes: Vec<u8>, fps: u32, tx: mpsc::Sender<VideoFrame>) {
    let mut ticker = tokio::time::interval(Duration::from_micros(1_000_000 / fps as u64));

    for (index, packet) in bytes.chunks(VIDEO_PACKET_BYTES).enumerate() {
        ticker.tick().await;

        let frame = VideoFrame {
            data: packet.to_vec(),
            timestamp_ms: index as u64 * 1000 / fps as u64,
        };

        if tx.send(frame).await.is_err() {
            debug!("Video consumer went away");
            return;
        }
    }

    debug!("Video file exhausted");
}
