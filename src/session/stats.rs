use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::SessionLifecycleState;

/// Statistics about an interview session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: SessionLifecycleState,

    /// Last known responding state (server-authoritative once reported)
    pub responding: bool,

    /// When streaming began
    pub started_at: Option<DateTime<Utc>>,

    pub stopped_at: Option<DateTime<Utc>>,

    pub stop_reason: Option<String>,

    pub audio_chunks_sent: usize,

    pub video_chunks_sent: usize,

    /// Payload bytes handed to the channel
    pub bytes_sent: usize,

    /// Outbound events dropped because the channel queue was full
    pub chunks_dropped: u64,

    /// Chat turns received from the server
    pub chat_turns: usize,

    /// Audio clips handed to playback
    pub audio_playbacks: usize,

    /// Messages appended to the view
    pub messages_appended: usize,
}

impl SessionStats {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            state: SessionLifecycleState::Idle,
            responding: false,
            started_at: None,
            stopped_at: None,
            stop_reason: None,
            audio_chunks_sent: 0,
            video_chunks_sent: 0,
            bytes_sent: 0,
            chunks_dropped: 0,
            chat_turns: 0,
            audio_playbacks: 0,
            messages_appended: 0,
        }
    }

    pub fn duration_secs(&self) -> Option<f64> {
        let started = self.started_at?;
        let end = self.stopped_at.unwrap_or_else(Utc::now);
        Some(end.signed_duration_since(started).num_milliseconds() as f64 / 1000.0)
    }
}
