use anyhow::{bail, Context, Result};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use super::events::{InboundEvent, OutboundEvent, SessionIdentity, EVENT_CONNECT};
use super::handle::{ChannelHandle, Transport};
use super::protocol::{
    encode_binary_event, encode_event, BinaryAssembler, EnginePacket, Frame, SocketPacket,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

const INBOUND_QUEUE: usize = 64;

/// Socket.IO channel settings
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Server base address, e.g. `http://localhost:8000/`
    pub endpoint: String,
    /// Socket.IO namespace
    pub namespace: String,
    /// Outbound events buffered before new ones are dropped
    pub send_queue_capacity: usize,
    /// Connection attempts before giving up (initial connect only)
    pub connect_attempts: u32,
    /// Upper bound for one connection attempt (TCP, TLS and WebSocket handshake)
    pub connect_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/".to_string(),
            namespace: "/".to_string(),
            send_queue_capacity: 256,
            connect_attempts: 5,
            connect_timeout: Duration::from_secs(10),
            reconnect_base: Duration::from_millis(800),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

impl ChannelConfig {
    /// Backoff before connection attempt `attempt + 1`
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(10);
        let factor = 1u32 << exp;
        self.reconnect_base
            .saturating_mul(factor)
            .min(self.reconnect_max)
    }
}

/// Build the WebSocket URL carrying the identity as query metadata
pub fn connect_url(endpoint: &str, identity: &SessionIdentity) -> Result<Url> {
    let mut url = Url::parse(endpoint).with_context(|| format!("Invalid endpoint: {}", endpoint))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => bail!("Unsupported endpoint scheme: {}", other),
    };
    if url.set_scheme(scheme).is_err() {
        bail!("Cannot use scheme {} for {}", scheme, endpoint);
    }

    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/socket.io/");
    }

    url.query_pairs_mut()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket")
        .append_pair("interviewToken", &identity.token)
        .append_pair("email", &identity.participant_email);

    Ok(url)
}

/// Socket.IO client over the WebSocket transport
pub struct SocketIoTransport {
    config: ChannelConfig,
}

impl SocketIoTransport {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }
}

impl Transport for SocketIoTransport {
    fn open(&self, identity: &SessionIdentity) -> ChannelHandle {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.send_queue_capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        if !identity.is_complete() {
            warn!("Opening channel with incomplete identity; the server will likely refuse it");
        }

        let task = match connect_url(&self.config.endpoint, identity) {
            Ok(url) => {
                info!("Opening channel to {}", self.config.endpoint);
                tokio::spawn(drive(
                    self.config.clone(),
                    url,
                    outbound_rx,
                    inbound_tx,
                    shutdown_rx,
                ))
            }
            Err(e) => {
                error!("Cannot open channel: {:#}", e);
                let message = format!("{:#}", e);
                tokio::spawn(async move {
                    let _ = inbound_tx.send(InboundEvent::ConnectError { message }).await;
                })
            }
        };

        ChannelHandle::new(outbound_tx, inbound_rx, Some(shutdown_tx), Some(task))
    }

    fn name(&self) -> &str {
        "socket.io"
    }
}

fn is_permanent_connect_error(err: &tungstenite::Error) -> bool {
    match err {
        tungstenite::Error::Http(resp) => {
            let code = resp.status().as_u16();
            code == 401 || code == 403
        }
        _ => false,
    }
}

async fn connect_with_retry(
    config: &ChannelConfig,
    url: &Url,
    inbound_tx: &mpsc::Sender<InboundEvent>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> Option<WsStream> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = tokio::select! {
            _ = &mut *shutdown_rx => return None,
            result = tokio::time::timeout(config.connect_timeout, connect_async(url.as_str())) => result,
        };

        let (permanent, message) = match result {
            Ok(Ok((ws, _))) => {
                info!("WebSocket connected (attempt {})", attempt);
                return Some(ws);
            }
            Ok(Err(e)) => (is_permanent_connect_error(&e), e.to_string()),
            Err(_) => (
                false,
                format!(
                    "connect timed out after {}ms",
                    config.connect_timeout.as_millis()
                ),
            ),
        };

        if permanent || attempt >= config.connect_attempts {
            error!("Connection failed after {} attempt(s): {}", attempt, message);
            let _ = inbound_tx
                .send(InboundEvent::ConnectError { message })
                .await;
            return None;
        }

        let delay = config.reconnect_delay(attempt);
        warn!(
            "Connection attempt {} failed: {} (retrying in {}ms)",
            attempt,
            message,
            delay.as_millis()
        );
        tokio::select! {
            _ = &mut *shutdown_rx => return None,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn drive(
    config: ChannelConfig,
    url: Url,
    mut outbound_rx: mpsc::Receiver<OutboundEvent>,
    inbound_tx: mpsc::Sender<InboundEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let Some(ws) = connect_with_retry(&config, &url, &inbound_tx, &mut shutdown_rx).await else {
        return;
    };

    let (sink, mut stream) = ws.split();
    let mut driver = Driver {
        sink,
        inbound_tx,
        namespace: config.namespace.clone(),
        assembler: BinaryAssembler::default(),
        connected: false,
        heartbeat: None,
    };

    let reason = loop {
        let deadline = driver.heartbeat.map(|(deadline, _)| deadline);

        tokio::select! {
            _ = &mut shutdown_rx => {
                driver.flush_outbound(&mut outbound_rx).await;
                driver.shutdown().await;
                return;
            }

            _ = sleep_until(deadline) => break "ping timeout".to_string(),

            Some(event) = outbound_rx.recv(), if driver.connected => {
                if let Err(e) = driver.write_event(event).await {
                    break format!("write failed: {:#}", e);
                }
            }

            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Err(reason) = driver.on_text(&text).await {
                        break reason;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if let Some(packet) = driver.assembler.push(data.to_vec()) {
                        driver.on_socket_packet(packet).await;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break "transport close".to_string(),
                Some(Ok(_)) => {}
                Some(Err(e)) => break format!("transport error: {}", e),
            },
        }
    };

    info!("Channel disconnected: {}", reason);
    driver.report_end(reason).await;
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct Driver {
    sink: WsSink,
    inbound_tx: mpsc::Sender<InboundEvent>,
    namespace: String,
    assembler: BinaryAssembler,
    connected: bool,
    /// Deadline for the next server ping, and the window to re-arm it with
    heartbeat: Option<(Instant, Duration)>,
}

impl Driver {
    async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
        };
        self.sink.send(message).await.context("WebSocket send failed")
    }

    async fn write_engine(&mut self, packet: EnginePacket) -> Result<()> {
        self.write_frame(Frame::Text(packet.encode())).await
    }

    async fn write_event(&mut self, event: OutboundEvent) -> Result<()> {
        let name = event.name();
        match event {
            OutboundEvent::SetResponding(active) => {
                let frame = encode_event(&self.namespace, name, Value::Bool(active));
                self.write_frame(frame).await
            }
            OutboundEvent::Chunk(chunk) => {
                let [header, body] =
                    encode_binary_event(&self.namespace, name, chunk.into_payload());
                self.write_frame(header).await?;
                self.write_frame(body).await
            }
        }
    }

    async fn deliver(&self, event: InboundEvent) {
        if self.inbound_tx.send(event).await.is_err() {
            debug!("Inbound event dropped: channel handle closed");
        }
    }

    /// Handle one text frame. `Err` carries the disconnect reason.
    async fn on_text(&mut self, text: &str) -> std::result::Result<(), String> {
        let packet = match EnginePacket::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Ignoring undecodable frame: {:#}", e);
                return Ok(());
            }
        };

        match packet {
            EnginePacket::Open(info) => {
                debug!(
                    "Engine.IO open: sid={} ping={}ms/{}ms",
                    info.sid, info.ping_interval, info.ping_timeout
                );
                let window = Duration::from_millis(info.ping_interval + info.ping_timeout);
                self.heartbeat = Some((Instant::now() + window, window));

                let connect = SocketPacket::Connect {
                    namespace: self.namespace.clone(),
                    data: None,
                };
                self.write_engine(EnginePacket::Message(connect.encode()))
                    .await
                    .map_err(|e| format!("{:#}", e))?;
            }
            EnginePacket::Ping(data) => {
                if let Some((deadline, window)) = self.heartbeat.as_mut() {
                    *deadline = Instant::now() + *window;
                }
                self.write_engine(EnginePacket::Pong(data))
                    .await
                    .map_err(|e| format!("{:#}", e))?;
            }
            EnginePacket::Message(body) => match SocketPacket::decode(&body) {
                Ok(packet) => {
                    if let Some(packet) = self.assembler.start(packet) {
                        if let SocketPacket::Disconnect { .. } = packet {
                            if packet.namespace() == self.namespace {
                                return Err("server disconnect".to_string());
                            }
                        }
                        self.on_socket_packet(packet).await;
                    }
                }
                Err(e) => warn!("Ignoring undecodable Socket.IO packet: {:#}", e),
            },
            EnginePacket::Close => return Err("server closed transport".to_string()),
            EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }

        Ok(())
    }

    async fn on_socket_packet(&mut self, packet: SocketPacket) {
        if packet.namespace() != self.namespace {
            debug!("Ignoring packet for namespace {}", packet.namespace());
            return;
        }

        match &packet {
            SocketPacket::Connect { .. } => {
                self.connected = true;
                if let Ok(Some(event)) = InboundEvent::from_wire(EVENT_CONNECT, None) {
                    self.deliver(event).await;
                }
            }
            SocketPacket::ConnectError { data, .. } => {
                let message = data
                    .as_ref()
                    .and_then(|d| d.get("message").and_then(Value::as_str).or(d.as_str()))
                    .unwrap_or("connection refused")
                    .to_string();
                self.deliver(InboundEvent::ConnectError { message }).await;
            }
            SocketPacket::Event { .. } | SocketPacket::BinaryEvent { .. } => {
                let Some((name, payload)) = packet.event() else {
                    warn!("Ignoring event packet without a name");
                    return;
                };
                match InboundEvent::from_wire(name, payload) {
                    Ok(Some(event)) => self.deliver(event).await,
                    Ok(None) => debug!("Ignoring unhandled event {}", name),
                    Err(e) => warn!("Dropping malformed {} event: {:#}", name, e),
                }
            }
            SocketPacket::Disconnect { .. } | SocketPacket::Ack { .. } | SocketPacket::BinaryAck { .. } => {}
        }
    }

    /// Write every event still queued when the client asked to close
    async fn flush_outbound(&mut self, outbound_rx: &mut mpsc::Receiver<OutboundEvent>) {
        if !self.connected {
            let mut discarded = 0;
            while outbound_rx.try_recv().is_ok() {
                discarded += 1;
            }
            if discarded > 0 {
                debug!("Discarding {} events queued before connect", discarded);
            }
            return;
        }

        let mut written = 0;
        while let Ok(event) = outbound_rx.try_recv() {
            if let Err(e) = self.write_event(event).await {
                warn!("Failed to flush queued events: {:#}", e);
                return;
            }
            written += 1;
        }
        if written > 0 {
            debug!("Flushed {} queued events before close", written);
        }
    }

    async fn shutdown(&mut self) {
        if self.connected {
            let disconnect = SocketPacket::Disconnect {
                namespace: self.namespace.clone(),
            };
            let _ = self
                .write_engine(EnginePacket::Message(disconnect.encode()))
                .await;
        }
        let _ = self.sink.close().await;
        debug!("Channel closed by client");
    }

    async fn report_end(&mut self, reason: String) {
        let _ = self.sink.close().await;
        let event = if self.connected {
            InboundEvent::Disconnected { reason }
        } else {
            InboundEvent::ConnectError { message: reason }
        };
        self.deliver(event).await;
    }
}
