pub mod auth;
pub mod channel;
pub mod config;
pub mod http;
pub mod media;
pub mod playback;
pub mod recorder;
pub mod session;

pub use auth::BackendClient;
pub use channel::{
    ChannelConfig, ChannelHandle, ChatTurn, InboundEvent, LoopbackTransport, OutboundEvent,
    SessionIdentity, SocketIoTransport, Transport,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use media::{
    CaptureBackend, CaptureFactory, CaptureSource, FileCaptureBackend, MediaConstraints,
    MediaStream,
};
pub use playback::{AudioOutput, Controls, LogOutput, MessageLog, PlaybackSink, WavDirOutput};
pub use recorder::{ChunkedRecorder, MediaChunk, MediaKind};
pub use session::{
    InterviewSession, SessionCommand, SessionConfig, SessionHandle, SessionLifecycleState,
    SessionStats,
};
