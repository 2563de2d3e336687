//! Chunked media recorders
//!
//! One recorder per media type turns a continuous device stream into
//! discrete chunks on a fixed wall-clock cadence.

mod chunk;
mod encoder;
mod recorder;

pub use chunk::{MediaChunk, MediaKind};
pub use encoder::{
    AudioChunkEncoder, AudioContainer, AudioEncoderConfig, ChunkEncoder, VideoChunkEncoder,
    VideoEncoderConfig,
};
pub use recorder::{ChunkedRecorder, RecorderStats};

pub type AudioRecorder = ChunkedRecorder<AudioChunkEncoder>;
pub type VideoRecorder = ChunkedRecorder<VideoChunkEncoder>;
