//! Session channel
//!
//! A persistent, bidirectional, event-typed connection to the interview
//! server. Media chunks and responding requests go out; lifecycle, chat and
//! responding-status events come in, strictly in arrival order.

mod events;
mod handle;
mod loopback;
pub mod protocol;
mod socketio;

pub use events::{
    ChatTurn, InboundEvent, OutboundEvent, SessionIdentity, EVENT_AUDIO_DATA, EVENT_CHAT,
    EVENT_CONNECT, EVENT_DISCONNECT, EVENT_RESPONDING_STATUS, EVENT_SET_RESPONDING,
    EVENT_VIDEO_DATA,
};
pub use handle::{ChannelHandle, Transport};
pub use loopback::{LoopbackPeer, LoopbackTransport};
pub use socketio::{connect_url, ChannelConfig, SocketIoTransport};
