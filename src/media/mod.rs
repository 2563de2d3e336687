//! Media capture facility
//!
//! Acquires microphone + camera streams. The crate ships a file-replay
//! backend; live devices plug in through [`CaptureBackend`].

pub mod backend;
pub mod file;

pub use backend::{
    AudioConstraints, AudioFrame, CaptureBackend, CaptureFactory, CaptureSource,
    MediaConstraints, MediaStream, VideoConstraints, VideoFrame,
};
pub use file::{AudioFile, FileCaptureBackend};
