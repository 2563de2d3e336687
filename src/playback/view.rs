use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// State of the session controls shown to the participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Controls {
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub toggle_enabled: bool,
    /// Responding indicator ("Stop Responding" when true)
    pub responding: bool,
    /// Live media preview is being rendered
    pub live: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            start_enabled: true,
            stop_enabled: false,
            toggle_enabled: false,
            responding: false,
            live: false,
        }
    }
}

/// One entry of the message panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayedMessage {
    pub text: String,
    pub timestamp: String,
}

/// The display surface a session drives
pub trait SessionView: Send {
    /// Append to the message panel. No deduplication.
    fn append_message(&mut self, text: &str, timestamp: &str);

    fn set_controls(&mut self, controls: Controls);
}

#[derive(Debug, Default)]
struct LogInner {
    messages: Vec<DisplayedMessage>,
    controls: Controls,
}

/// In-process view shared between a session and its readers
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    inner: Arc<Mutex<LogInner>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<DisplayedMessage> {
        self.inner.lock().messages.clone()
    }

    pub fn controls(&self) -> Controls {
        self.inner.lock().controls
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.messages.clear();
        inner.controls = Controls::default();
    }
}

impl SessionView for MessageLog {
    fn append_message(&mut self, text: &str, timestamp: &str) {
        self.inner.lock().messages.push(DisplayedMessage {
            text: text.to_string(),
            timestamp: timestamp.to_string(),
        });
    }

    fn set_controls(&mut self, controls: Controls) {
        self.inner.lock().controls = controls;
    }
}
