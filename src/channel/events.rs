use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::recorder::{MediaChunk, MediaKind};

// Inbound event names
pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_RESPONDING_STATUS: &str = "getRespondingStatus";
pub const EVENT_CHAT: &str = "chat";

// Outbound event names
pub const EVENT_SET_RESPONDING: &str = "respondingStatus";
pub const EVENT_AUDIO_DATA: &str = "audioData";
pub const EVENT_VIDEO_DATA: &str = "videoData";

/// Credentials presented when opening the channel.
///
/// Sent as connection metadata, never as event payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub token: String,
    pub participant_email: String,
}

impl SessionIdentity {
    pub fn new(token: impl Into<String>, participant_email: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            participant_email: participant_email.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.token.is_empty() && !self.participant_email.is_empty()
    }
}

impl std::fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("token", &"<redacted>")
            .field("participant_email", &self.participant_email)
            .finish()
    }
}

/// One conversational turn pushed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub message: String,
    pub timestamp: String,
    /// Base64-encoded audio clip of the message, if any
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub interview_ended: bool,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RespondingStatusPayload {
    status: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Events delivered by the channel, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Transport and namespace handshake completed
    Connected,
    /// Server-authoritative responding state
    RespondingStatus {
        active: bool,
        message: Option<String>,
    },
    ChatTurn(ChatTurn),
    /// The connection attempt was refused or never completed
    ConnectError { message: String },
    /// An established connection went away
    Disconnected { reason: String },
}

impl InboundEvent {
    /// Map a named wire event to a typed event.
    ///
    /// `Ok(None)` for event names this client does not handle; `Err` when a
    /// known event carries a malformed payload.
    pub fn from_wire(name: &str, payload: Option<&Value>) -> Result<Option<Self>> {
        let event = match name {
            EVENT_CONNECT => Self::Connected,
            EVENT_DISCONNECT => Self::Disconnected {
                reason: payload
                    .and_then(Value::as_str)
                    .unwrap_or("server disconnect")
                    .to_string(),
            },
            EVENT_RESPONDING_STATUS => {
                let payload: RespondingStatusPayload =
                    serde_json::from_value(payload.cloned().unwrap_or(Value::Null))
                        .context("Malformed getRespondingStatus payload")?;
                Self::RespondingStatus {
                    active: payload.status,
                    message: payload.message,
                }
            }
            EVENT_CHAT => {
                let turn: ChatTurn =
                    serde_json::from_value(payload.cloned().unwrap_or(Value::Null))
                        .context("Malformed chat payload")?;
                Self::ChatTurn(turn)
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => EVENT_CONNECT,
            Self::RespondingStatus { .. } => EVENT_RESPONDING_STATUS,
            Self::ChatTurn(_) => EVENT_CHAT,
            Self::ConnectError { .. } => "connect_error",
            Self::Disconnected { .. } => EVENT_DISCONNECT,
        }
    }
}

/// Events sent upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Request to change who is responding
    SetResponding(bool),
    Chunk(MediaChunk),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetResponding(_) => EVENT_SET_RESPONDING,
            Self::Chunk(chunk) => match chunk.kind() {
                MediaKind::Audio => EVENT_AUDIO_DATA,
                MediaKind::Video => EVENT_VIDEO_DATA,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_with_optional_fields_missing() {
        let payload = json!({"message": "Tell me about yourself", "timestamp": "T1"});
        let event = InboundEvent::from_wire(EVENT_CHAT, Some(&payload)).unwrap().unwrap();

        match event {
            InboundEvent::ChatTurn(turn) => {
                assert_eq!(turn.message, "Tell me about yourself");
                assert_eq!(turn.timestamp, "T1");
                assert!(turn.audio.is_none());
                assert!(!turn.interview_ended);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_chat_from_server_shape() {
        let payload = json!({
            "message": "Thanks, that's all",
            "role": "assistant",
            "interview_ended": true,
            "timestamp": "2024-05-01T10:00:00",
            "audio": "SUQz"
        });
        let event = InboundEvent::from_wire(EVENT_CHAT, Some(&payload)).unwrap().unwrap();

        let InboundEvent::ChatTurn(turn) = event else {
            panic!("expected chat turn");
        };
        assert!(turn.interview_ended);
        assert_eq!(turn.audio.as_deref(), Some("SUQz"));
        assert_eq!(turn.role.as_deref(), Some("assistant"));
    }

    #[test]
    fn test_responding_status() {
        let payload = json!({"status": false, "message": "Success"});
        let event = InboundEvent::from_wire(EVENT_RESPONDING_STATUS, Some(&payload))
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            InboundEvent::RespondingStatus {
                active: false,
                message: Some("Success".to_string())
            }
        );

        let payload = json!({"status": true});
        let event = InboundEvent::from_wire(EVENT_RESPONDING_STATUS, Some(&payload))
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            InboundEvent::RespondingStatus {
                active: true,
                message: None
            }
        );
    }

    #[test]
    fn test_unknown_event_ignored() {
        let payload = json!({"anything": 1});
        assert!(InboundEvent::from_wire("leaderboard", Some(&payload))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_malformed_payload_is_error() {
        let payload = json!({"timestamp": "T1"});
        assert!(InboundEvent::from_wire(EVENT_CHAT, Some(&payload)).is_err());
        assert!(InboundEvent::from_wire(EVENT_RESPONDING_STATUS, None).is_err());
    }

    #[test]
    fn test_outbound_names() {
        let audio = OutboundEvent::Chunk(MediaChunk::new(MediaKind::Audio, vec![1]));
        let video = OutboundEvent::Chunk(MediaChunk::new(MediaKind::Video, vec![1]));
        assert_eq!(audio.name(), "audioData");
        assert_eq!(video.name(), "videoData");
        assert_eq!(OutboundEvent::SetResponding(true).name(), "respondingStatus");
    }

    #[test]
    fn test_identity_debug_redacts_token() {
        let identity = SessionIdentity::new("secret-jwt", "a@b.c");
        let debug = format!("{:?}", identity);
        assert!(!debug.contains("secret-jwt"));
        assert!(debug.contains("a@b.c"));
    }
}
