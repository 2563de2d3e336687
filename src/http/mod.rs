//! HTTP control surface
//!
//! Drives a single interview session over REST:
//! - POST /session/start - Start a new session (409 while one is active)
//! - POST /session/stop - Stop the current session
//! - POST /session/responding - Toggle the responding state
//! - GET /session/status - Session statistics
//! - GET /session/messages - Message panel and controls
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{ActiveSession, AppState, SessionFactory};
