use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::events::{InboundEvent, OutboundEvent, SessionIdentity};

/// Opens session channels.
///
/// `open` never fails synchronously: the outcome of connecting is reported
/// through the handle's events (`Connected`, `ConnectError`, `Disconnected`).
pub trait Transport: Send + Sync {
    fn open(&self, identity: &SessionIdentity) -> ChannelHandle;

    /// Get transport name for logging
    fn name(&self) -> &str;
}

/// The client side of one session channel
pub struct ChannelHandle {
    outbound: mpsc::Sender<OutboundEvent>,
    inbound: mpsc::Receiver<InboundEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    closed: bool,
    dropped: u64,
}

impl ChannelHandle {
    /// Wrap the queues of a running transport.
    ///
    /// `shutdown` and `task` are the transport driver's stop signal and task,
    /// if it has one.
    pub fn new(
        outbound: mpsc::Sender<OutboundEvent>,
        inbound: mpsc::Receiver<InboundEvent>,
        shutdown: Option<oneshot::Sender<()>>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            shutdown,
            task,
            closed: false,
            dropped: 0,
        }
    }

    /// Queue an event for transmission without waiting.
    ///
    /// The outbound queue is bounded; when it is full the event is dropped
    /// and counted. Returns whether the event was queued.
    pub fn send(&mut self, event: OutboundEvent) -> bool {
        if self.closed {
            return false;
        }

        match self.outbound.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.dropped += 1;
                warn!(
                    "Outbound queue full, dropping {} ({} dropped so far)",
                    event.name(),
                    self.dropped
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                debug!("Transport gone, discarding {}", event.name());
                false
            }
        }
    }

    /// Next inbound event in arrival order.
    ///
    /// Returns `None` once the channel is closed or the transport has ended.
    pub async fn next_event(&mut self) -> Option<InboundEvent> {
        if self.closed {
            return None;
        }
        self.inbound.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Events dropped because the outbound queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Terminate the transport. Events that arrive afterwards are discarded.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.inbound.close();
        while self.inbound.try_recv().is_ok() {}

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        // Kept in place while awaiting so `abort` can still reach it
        if let Some(task) = self.task.as_mut() {
            if let Err(e) = task.await {
                warn!("Channel task ended abnormally: {}", e);
            }
            self.task = None;
        }
    }

    /// Tear the transport down without waiting for it
    pub fn abort(&mut self) {
        self.closed = true;
        self.shutdown = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
