//! Interview session
//!
//! The session owns devices, recorders and the channel, and drives the
//! `Idle → Connecting → Streaming → Stopped` lifecycle:
//! - acquires microphone and camera on start
//! - streams recorder chunks once the channel reports connected
//! - applies server responding status and chat turns
//! - tears everything down on stop, interview end or connection loss

mod config;
mod handle;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use handle::SessionHandle;
pub use session::InterviewSession;
pub use state::{SessionCommand, SessionLifecycleState, StopReason};
pub use stats::SessionStats;
