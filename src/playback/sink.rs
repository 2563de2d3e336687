use anyhow::{Context, Result};
use base64::Engine;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::decode::decode_clip;
use super::output::AudioOutput;
use super::view::{Controls, DisplayedMessage, SessionView};

/// Renders inbound content: text to the view, audio to the output.
///
/// Chat text can be scheduled a fixed delay after its audio starts so the two
/// are perceived together. Scheduled messages keep call order.
pub struct PlaybackSink {
    view: Box<dyn SessionView>,
    output: Arc<dyn AudioOutput>,
    text_delay: Duration,
    pending: VecDeque<(Instant, DisplayedMessage)>,
    appended: usize,
}

impl PlaybackSink {
    pub fn new(view: Box<dyn SessionView>, output: Arc<dyn AudioOutput>, text_delay: Duration) -> Self {
        Self {
            view,
            output,
            text_delay,
            pending: VecDeque::new(),
            appended: 0,
        }
    }

    /// Append to the view now
    pub fn append_message(&mut self, text: &str, timestamp: &str) {
        self.view.append_message(text, timestamp);
        self.appended += 1;
    }

    /// Append to the view once the text delay has elapsed
    pub fn schedule_message(&mut self, text: &str, timestamp: &str) {
        let due = Instant::now() + self.text_delay;
        self.pending.push_back((
            due,
            DisplayedMessage {
                text: text.to_string(),
                timestamp: timestamp.to_string(),
            },
        ));
    }

    /// When the oldest scheduled message becomes due
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.front().map(|(due, _)| *due)
    }

    /// Append every scheduled message that is due. Returns how many.
    pub fn deliver_due(&mut self) -> usize {
        let now = Instant::now();
        let mut delivered = 0;

        while self.pending.front().is_some_and(|(due, _)| *due <= now) {
            if let Some((_, message)) = self.pending.pop_front() {
                self.append_message(&message.text, &message.timestamp);
                delivered += 1;
            }
        }

        delivered
    }

    /// Append every scheduled message immediately, in order
    pub fn flush_pending(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for (_, message) in pending {
            self.append_message(&message.text, &message.timestamp);
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Messages appended so far
    pub fn appended(&self) -> usize {
        self.appended
    }

    pub fn set_controls(&mut self, controls: Controls) {
        self.view.set_controls(controls);
    }

    /// Decode and play a base64 audio clip in the background.
    ///
    /// Failures are logged; they never reach the caller.
    pub fn play_audio(&self, payload: &str) -> JoinHandle<()> {
        let output = Arc::clone(&self.output);
        let payload = payload.to_string();

        tokio::task::spawn_blocking(move || match play_blocking(output.as_ref(), &payload) {
            Ok(()) => debug!("Audio clip played via {}", output.name()),
            Err(e) => warn!("Audio playback failed: {:#}", e),
        })
    }
}

fn play_blocking(output: &dyn AudioOutput, payload: &str) -> Result<()> {
    // Tolerate data URLs ("data:audio/mp3;base64,....")
    let encoded = match payload.split_once(";base64,") {
        Some((_, data)) => data,
        None => payload,
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .context("Invalid base64 audio payload")?;

    let clip = decode_clip(bytes)?;
    output
        .play(&clip)
        .with_context(|| format!("{} output rejected clip", output.name()))
}
