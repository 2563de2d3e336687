use anyhow::{bail, Result};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::chunk::{MediaChunk, MediaKind};
use super::encoder::ChunkEncoder;

/// Totals for one recorder run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub chunks: usize,
    pub bytes: usize,
}

/// Time-sliced recorder
///
/// Consumes a device stream and pushes one [`MediaChunk`] into `sink` every
/// `timeslice`. Flushes with nothing buffered emit nothing.
pub struct ChunkedRecorder<E: ChunkEncoder> {
    kind: MediaKind,
    format: String,
    timeslice: Duration,
    encoder: Option<E>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<RecorderStats>>,
}

impl<E: ChunkEncoder> ChunkedRecorder<E> {
    pub fn new(encoder: E, timeslice: Duration) -> Self {
        Self {
            kind: encoder.kind(),
            format: encoder.format(),
            timeslice,
            encoder: Some(encoder),
            stop_tx: None,
            task: None,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Content type of the emitted chunks
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Begin capturing `frames`; chunks are pushed into `sink`
    pub fn start(
        &mut self,
        frames: mpsc::Receiver<E::Frame>,
        sink: mpsc::Sender<MediaChunk>,
    ) -> Result<()> {
        let Some(encoder) = self.encoder.take() else {
            bail!("{:?} recorder already started", self.kind);
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_tx = Some(stop_tx);
        self.task = Some(tokio::spawn(run_recorder(
            encoder,
            frames,
            sink,
            self.timeslice,
            stop_rx,
        )));

        info!(
            "{:?} recorder started ({}ms timeslice, {})",
            self.kind,
            self.timeslice.as_millis(),
            self.format
        );
        Ok(())
    }

    /// Whether the capture task is still running
    pub fn is_recording(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Ask the capture task to flush its remainder and exit
    pub fn request_stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // Err means the task already exited on its own
            let _ = stop_tx.send(());
        }
    }

    /// Wait for the capture task to exit
    pub async fn join(&mut self) -> RecorderStats {
        let Some(task) = self.task.take() else {
            return RecorderStats::default();
        };

        match task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("{:?} recorder task failed: {}", self.kind, e);
                RecorderStats::default()
            }
        }
    }

    /// Stop capturing: flush the remainder, release the stream, return totals
    pub async fn stop(&mut self) -> RecorderStats {
        self.request_stop();
        self.join().await
    }

    /// Tear the task down without flushing
    pub fn abort(&mut self) {
        self.stop_tx = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<E: ChunkEncoder> Drop for ChunkedRecorder<E> {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn run_recorder<E: ChunkEncoder>(
    mut encoder: E,
    mut frames: mpsc::Receiver<E::Frame>,
    sink: mpsc::Sender<MediaChunk>,
    timeslice: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) -> RecorderStats {
    let kind = encoder.kind();
    let mut stats = RecorderStats::default();
    let mut ticker = tokio::time::interval_at(Instant::now() + timeslice, timeslice);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = &mut stop_rx => {
                // Frames captured before the stop belong to the final chunk
                while let Ok(frame) = frames.try_recv() {
                    encoder.push(frame);
                }
                emit(&mut encoder, &sink, &mut stats).await;
                break;
            }

            frame = frames.recv() => match frame {
                Some(frame) => encoder.push(frame),
                None => {
                    // Device went away: go quiet, the session sees no more chunks
                    debug!("{:?} device stream ended, recorder going quiet", kind);
                    break;
                }
            },

            _ = ticker.tick() => {
                if !emit(&mut encoder, &sink, &mut stats).await {
                    break;
                }
            }
        }
    }

    info!(
        "{:?} recorder stopped: {} chunks, {} bytes",
        kind, stats.chunks, stats.bytes
    );
    stats
}

/// Flush and push one chunk. Returns false once the sink is gone.
async fn emit<E: ChunkEncoder>(
    encoder: &mut E,
    sink: &mpsc::Sender<MediaChunk>,
    stats: &mut RecorderStats,
) -> bool {
    let chunk = match encoder.flush() {
        Ok(Some(chunk)) => chunk,
        Ok(None) => return true,
        Err(e) => {
            error!("Failed to encode {:?} chunk: {:#}", encoder.kind(), e);
            return true;
        }
    };

    let len = chunk.len();
    if sink.send(chunk).await.is_err() {
        debug!("{:?} chunk sink closed", encoder.kind());
        return false;
    }

    stats.chunks += 1;
    stats.bytes += len;
    true
}
