use tokio::sync::mpsc;
use tracing::debug;

use super::events::{InboundEvent, OutboundEvent, SessionIdentity};
use super::handle::{ChannelHandle, Transport};

/// Server end of an in-memory channel
pub struct LoopbackPeer {
    /// Identity presented by the client at open time
    pub identity: SessionIdentity,
    inbound_tx: mpsc::Sender<InboundEvent>,
    outbound_rx: mpsc::Receiver<OutboundEvent>,
}

impl LoopbackPeer {
    /// Push an event to the client. Returns false once the client closed.
    pub async fn emit(&self, event: InboundEvent) -> bool {
        self.inbound_tx.send(event).await.is_ok()
    }

    /// Next event sent by the client
    pub async fn recv(&mut self) -> Option<OutboundEvent> {
        self.outbound_rx.recv().await
    }

    /// Event already sent by the client, without waiting
    pub fn try_recv(&mut self) -> Option<OutboundEvent> {
        self.outbound_rx.try_recv().ok()
    }

    /// Whether the client has closed its end
    pub fn is_closed(&self) -> bool {
        self.inbound_tx.is_closed()
    }
}

/// Transport whose channels terminate in [`LoopbackPeer`]s handed to the caller
pub struct LoopbackTransport {
    capacity: usize,
    peers: mpsc::UnboundedSender<LoopbackPeer>,
}

impl LoopbackTransport {
    pub fn new(capacity: usize) -> (Self, mpsc::UnboundedReceiver<LoopbackPeer>) {
        let (peers, peers_rx) = mpsc::unbounded_channel();
        (
            Self {
                capacity: capacity.max(1),
                peers,
            },
            peers_rx,
        )
    }
}

impl Transport for LoopbackTransport {
    fn open(&self, identity: &SessionIdentity) -> ChannelHandle {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.capacity);

        let peer = LoopbackPeer {
            identity: identity.clone(),
            inbound_tx,
            outbound_rx,
        };
        if self.peers.send(peer).is_err() {
            debug!("Nobody is listening for loopback peers");
        }

        ChannelHandle::new(outbound_tx, inbound_rx, None, None)
    }

    fn name(&self) -> &str {
        "loopback"
    }
}
