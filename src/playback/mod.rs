//! Playback sink
//!
//! Appends inbound messages to the session view and plays inbound audio.

mod decode;
mod output;
mod sink;
mod view;

pub use decode::{decode_clip, DecodedClip};
pub use output::{AudioOutput, LogOutput, WavDirOutput};
pub use sink::PlaybackSink;
pub use view::{Controls, DisplayedMessage, MessageLog, SessionView};
