use super::session::InterviewSession;
use super::state::{SessionCommand, SessionLifecycleState};
use super::stats::SessionStats;
use anyhow::{bail, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

const COMMAND_QUEUE: usize = 16;

/// Cloneable control surface for a session running on its own task
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    commands: mpsc::Sender<SessionCommand>,
    stats: watch::Receiver<SessionStats>,
}

impl SessionHandle {
    /// Move the session onto a task and return a handle to it
    pub fn spawn(session: InterviewSession) -> (Self, JoinHandle<SessionStats>) {
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE);
        let stats = session.subscribe();
        let session_id = session.session_id().to_string();

        let task = tokio::spawn(session.run(rx));

        (
            Self {
                session_id,
                commands,
                stats,
            },
            task,
        )
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn start(&self) -> Result<()> {
        self.send(SessionCommand::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(SessionCommand::Stop).await
    }

    pub async fn toggle_responding(&self) -> Result<()> {
        self.send(SessionCommand::ToggleResponding).await
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }

    pub fn state(&self) -> SessionLifecycleState {
        self.stats.borrow().state
    }

    /// Wait until the session reaches `state`.
    ///
    /// Fails if the session task ends first.
    pub async fn wait_for(&self, state: SessionLifecycleState) -> Result<SessionStats> {
        let mut rx = self.stats.clone();
        let reached = rx
            .wait_for(|stats| stats.state == state)
            .await
            .map(|stats| stats.clone());

        match reached {
            Ok(stats) => Ok(stats),
            Err(_) => {
                let last = rx.borrow().clone();
                if last.state == state {
                    Ok(last)
                } else {
                    bail!(
                        "Session {} ended in {:?} before reaching {:?}",
                        self.session_id,
                        last.state,
                        state
                    )
                }
            }
        }
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        debug!("Sending {:?} to session {}", command, self.session_id);
        if self.commands.send(command).await.is_err() {
            bail!("Session {} is no longer running", self.session_id);
        }
        Ok(())
    }
}
