// Shared fixtures for integration tests: a capture backend the test feeds by
// hand and an audio output that only counts clips.

#![allow(dead_code)]

use anyhow::{bail, Result};
use interview_stream::media::{
    AudioFrame, CaptureBackend, MediaConstraints, MediaStream, VideoFrame,
};
use interview_stream::playback::{AudioOutput, DecodedClip};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Senders for the device streams of a [`ScriptedCapture`]
#[derive(Clone, Default)]
pub struct Feeds {
    audio: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>,
    video: Arc<Mutex<Option<mpsc::Sender<VideoFrame>>>>,
    released: Arc<AtomicBool>,
    acquired: Arc<AtomicUsize>,
}

impl Feeds {
    pub async fn audio(&self, samples: Vec<i16>) {
        let tx = self.audio.lock().clone();
        let tx = tx.expect("audio device not acquired");
        tx.send(AudioFrame {
            samples,
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        })
        .await
        .expect("audio recorder gone");
    }

    pub async fn video(&self, data: Vec<u8>) {
        let tx = self.video.lock().clone();
        let tx = tx.expect("video device not acquired");
        tx.send(VideoFrame {
            data,
            timestamp_ms: 0,
        })
        .await
        .expect("video recorder gone");
    }

    /// Simulate the microphone going away
    pub fn end_audio(&self) {
        self.audio.lock().take();
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

/// Capture backend whose frames come from the test
pub struct ScriptedCapture {
    feeds: Feeds,
    deny: bool,
    capturing: bool,
}

impl ScriptedCapture {
    pub fn new() -> (Self, Feeds) {
        let feeds = Feeds::default();
        (
            Self {
                feeds: feeds.clone(),
                deny: false,
                capturing: false,
            },
            feeds,
        )
    }

    /// A backend whose devices are always denied
    pub fn denied() -> (Self, Feeds) {
        let (mut capture, feeds) = Self::new();
        capture.deny = true;
        (capture, feeds)
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ScriptedCapture {
    async fn acquire(&mut self, _constraints: &MediaConstraints) -> Result<MediaStream> {
        if self.deny {
            bail!("Permission denied");
        }

        let (audio_tx, audio) = mpsc::channel(64);
        let (video_tx, video) = mpsc::channel(64);
        *self.feeds.audio.lock() = Some(audio_tx);
        *self.feeds.video.lock() = Some(video_tx);
        self.feeds.acquired.fetch_add(1, Ordering::SeqCst);
        self.capturing = true;

        Ok(MediaStream { audio, video })
    }

    async fn release(&mut self) -> Result<()> {
        self.feeds.audio.lock().take();
        self.feeds.video.lock().take();
        self.feeds.released.store(true, Ordering::SeqCst);
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Output that records how many clips it was given
#[derive(Default)]
pub struct CountingOutput {
    played: AtomicUsize,
}

impl CountingOutput {
    pub fn played(&self) -> usize {
        self.played.load(Ordering::SeqCst)
    }
}

impl AudioOutput for CountingOutput {
    fn play(&self, _clip: &DecodedClip) -> Result<()> {
        self.played.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// A short 16 kHz mono WAV file in memory
pub fn wav_bytes(samples: &[i16]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
