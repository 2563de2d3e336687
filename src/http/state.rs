use crate::playback::MessageLog;
use crate::session::{InterviewSession, SessionHandle, SessionStats};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Builds a fresh session writing into the shared message log
pub type SessionFactory = Arc<dyn Fn(MessageLog) -> Result<InterviewSession> + Send + Sync>;

/// The session currently owned by the control surface
pub struct ActiveSession {
    pub handle: SessionHandle,
    pub task: JoinHandle<SessionStats>,
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub factory: SessionFactory,
    /// At most one session at a time
    pub session: Arc<RwLock<Option<ActiveSession>>>,
    /// Message panel and controls of the current session
    pub log: MessageLog,
}

impl AppState {
    pub fn new(factory: SessionFactory) -> Self {
        Self {
            factory,
            session: Arc::new(RwLock::new(None)),
            log: MessageLog::new(),
        }
    }
}
