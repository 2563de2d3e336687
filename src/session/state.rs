use serde::Serialize;
use std::fmt;

/// Lifecycle of one session instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionLifecycleState {
    Idle,
    Connecting,
    Streaming,
    /// Terminal; a new session object is needed to stream again
    Stopped,
}

impl SessionLifecycleState {
    /// Holds devices and a channel
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Streaming)
    }
}

/// User commands accepted by a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Stop,
    ToggleResponding,
}

/// Why a session left the active states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    UserRequested,
    InterviewEnded,
    ConnectFailed(String),
    ConnectionLost(String),
}

impl StopReason {
    /// Status line appended to the message panel
    pub fn terminal_message(&self) -> String {
        match self {
            Self::UserRequested | Self::InterviewEnded => "Stopped".to_string(),
            Self::ConnectFailed(message) => format!("Could not connect: {}", message),
            Self::ConnectionLost(reason) => format!("Connection lost: {}", reason),
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserRequested => write!(f, "stop requested"),
            Self::InterviewEnded => write!(f, "interview ended"),
            Self::ConnectFailed(message) => write!(f, "connect failed ({})", message),
            Self::ConnectionLost(reason) => write!(f, "connection lost ({})", reason),
        }
    }
}
