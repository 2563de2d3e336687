use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use super::decode::DecodedClip;

/// Where decoded clips are rendered
///
/// Called from a blocking thread; implementations may block.
pub trait AudioOutput: Send + Sync {
    fn play(&self, clip: &DecodedClip) -> Result<()>;

    /// Get output name for logging
    fn name(&self) -> &str;
}

/// Logs each clip instead of playing it
pub struct LogOutput;

impl AudioOutput for LogOutput {
    fn play(&self, clip: &DecodedClip) -> Result<()> {
        info!(
            "Audio clip: {:.1}s, {}Hz, {} channels",
            clip.duration_seconds(),
            clip.sample_rate,
            clip.channels
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Writes each clip to `<dir>/clip-NNN.wav`
pub struct WavDirOutput {
    dir: PathBuf,
    next_index: AtomicUsize,
}

impl WavDirOutput {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create clip directory: {}", dir.display()))?;

        Ok(Self {
            dir,
            next_index: AtomicUsize::new(0),
        })
    }
}

impl AudioOutput for WavDirOutput {
    fn play(&self, clip: &DecodedClip) -> Result<()> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("clip-{:03}.wav", index));

        let spec = hound::WavSpec {
            channels: clip.channels.max(1),
            sample_rate: clip.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;
        for &sample in &clip.samples {
            writer
                .write_sample(sample)
                .context("Failed to write sample to WAV")?;
        }
        writer.finalize().context("Failed to finalize WAV file")?;

        info!(
            "Saved audio clip {} ({:.1}s)",
            path.display(),
            clip.duration_seconds()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "wav-dir"
    }
}
