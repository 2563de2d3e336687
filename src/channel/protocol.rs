//! Engine.IO v4 / Socket.IO v5 framing over a WebSocket transport.
//!
//! Text frames carry `<engine type><socket packet>`; binary attachments of a
//! Socket.IO binary event follow as raw binary frames.

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

/// Engine.IO handshake payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or_else(|| anyhow!("Empty Engine.IO packet"))?;
        let body = chars.as_str();

        let packet = match kind {
            '0' => Self::Open(serde_json::from_str(body).context("Malformed Engine.IO open")?),
            '1' => Self::Close,
            '2' => Self::Ping(body.to_string()),
            '3' => Self::Pong(body.to_string()),
            '4' => Self::Message(body.to_string()),
            '5' => Self::Upgrade,
            '6' => Self::Noop,
            other => bail!("Unknown Engine.IO packet type {:?}", other),
        };

        Ok(packet)
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Open(info) => format!(
                "0{}",
                json!({
                    "sid": info.sid,
                    "upgrades": info.upgrades,
                    "pingInterval": info.ping_interval,
                    "pingTimeout": info.ping_timeout,
                })
            ),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{}", data),
            Self::Pong(data) => format!("3{}", data),
            Self::Message(body) => format!("4{}", body),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        data: Value,
    },
    Ack {
        namespace: String,
        id: Option<u64>,
        data: Value,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
    BinaryEvent {
        namespace: String,
        id: Option<u64>,
        attachments: usize,
        data: Value,
    },
    BinaryAck {
        namespace: String,
        id: Option<u64>,
        attachments: usize,
        data: Value,
    },
}

impl SocketPacket {
    pub fn decode(text: &str) -> Result<Self> {
        let mut rest = text;
        let kind = take_char(&mut rest).ok_or_else(|| anyhow!("Empty Socket.IO packet"))?;

        let attachments = if kind == '5' || kind == '6' {
            let count = take_digits(&mut rest);
            if !rest.starts_with('-') {
                bail!("Binary packet without attachment count");
            }
            rest = &rest[1..];
            count
                .ok_or_else(|| anyhow!("Binary packet without attachment count"))?
                .parse::<usize>()?
        } else {
            0
        };

        let namespace = if rest.starts_with('/') {
            let end = rest.find(',').unwrap_or(rest.len());
            let namespace = rest[..end].to_string();
            rest = rest.get(end + 1..).unwrap_or("");
            namespace
        } else {
            "/".to_string()
        };

        let id = take_digits(&mut rest).map(|d| d.parse::<u64>()).transpose()?;

        let data = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(rest).context("Malformed Socket.IO payload")?)
        };

        let packet = match kind {
            '0' => Self::Connect { namespace, data },
            '1' => Self::Disconnect { namespace },
            '2' => Self::Event {
                namespace,
                id,
                data: data.ok_or_else(|| anyhow!("Event without payload"))?,
            },
            '3' => Self::Ack {
                namespace,
                id,
                data: data.unwrap_or(Value::Array(Vec::new())),
            },
            '4' => Self::ConnectError { namespace, data },
            '5' => Self::BinaryEvent {
                namespace,
                id,
                attachments,
                data: data.ok_or_else(|| anyhow!("Binary event without payload"))?,
            },
            '6' => Self::BinaryAck {
                namespace,
                id,
                attachments,
                data: data.unwrap_or(Value::Array(Vec::new())),
            },
            other => bail!("Unknown Socket.IO packet type {:?}", other),
        };

        Ok(packet)
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Connect { namespace, data } => {
                format!("0{}{}", ns_prefix(namespace), opt_json(data))
            }
            Self::Disconnect { namespace } => format!("1{}", ns_prefix(namespace)),
            Self::Event {
                namespace,
                id,
                data,
            } => format!("2{}{}{}", ns_prefix(namespace), opt_id(id), data),
            Self::Ack {
                namespace,
                id,
                data,
            } => format!("3{}{}{}", ns_prefix(namespace), opt_id(id), data),
            Self::ConnectError { namespace, data } => {
                format!("4{}{}", ns_prefix(namespace), opt_json(data))
            }
            Self::BinaryEvent {
                namespace,
                id,
                attachments,
                data,
            } => format!(
                "5{}-{}{}{}",
                attachments,
                ns_prefix(namespace),
                opt_id(id),
                data
            ),
            Self::BinaryAck {
                namespace,
                id,
                attachments,
                data,
            } => format!(
                "6{}-{}{}{}",
                attachments,
                ns_prefix(namespace),
                opt_id(id),
                data
            ),
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::Ack { namespace, .. }
            | Self::ConnectError { namespace, .. }
            | Self::BinaryEvent { namespace, .. }
            | Self::BinaryAck { namespace, .. } => namespace,
        }
    }

    /// Event name and first argument of an `EVENT` packet
    pub fn event(&self) -> Option<(&str, Option<&Value>)> {
        match self {
            Self::Event { data, .. } | Self::BinaryEvent { data, .. } => {
                let args = data.as_array()?;
                let name = args.first()?.as_str()?;
                Some((name, args.get(1)))
            }
            _ => None,
        }
    }
}

/// One WebSocket frame to write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Frames for an event with a single JSON argument
pub fn encode_event(namespace: &str, name: &str, arg: Value) -> Frame {
    let packet = SocketPacket::Event {
        namespace: namespace.to_string(),
        id: None,
        data: json!([name, arg]),
    };
    Frame::Text(EnginePacket::Message(packet.encode()).encode())
}

/// Frames for an event whose single argument is a binary buffer
pub fn encode_binary_event(namespace: &str, name: &str, payload: Vec<u8>) -> [Frame; 2] {
    let packet = SocketPacket::BinaryEvent {
        namespace: namespace.to_string(),
        id: None,
        attachments: 1,
        data: json!([name, {"_placeholder": true, "num": 0}]),
    };
    [
        Frame::Text(EnginePacket::Message(packet.encode()).encode()),
        Frame::Binary(payload),
    ]
}

/// Reassembles inbound binary events from their attachment frames
#[derive(Debug, Default)]
pub struct BinaryAssembler {
    pending: Option<SocketPacket>,
    buffers: Vec<Vec<u8>>,
}

impl BinaryAssembler {
    /// Begin collecting attachments for a binary packet.
    ///
    /// Packets without attachments are returned immediately.
    pub fn start(&mut self, packet: SocketPacket) -> Option<SocketPacket> {
        let expected = match &packet {
            SocketPacket::BinaryEvent { attachments, .. }
            | SocketPacket::BinaryAck { attachments, .. } => *attachments,
            _ => 0,
        };

        self.buffers.clear();
        if expected == 0 {
            self.pending = None;
            return Some(packet);
        }

        self.pending = Some(packet);
        None
    }

    /// Feed one binary frame; returns the packet once all attachments arrived.
    ///
    /// Placeholders are replaced by base64 strings of the attachment bytes.
    pub fn push(&mut self, data: Vec<u8>) -> Option<SocketPacket> {
        let expected = match self.pending.as_ref()? {
            SocketPacket::BinaryEvent { attachments, .. }
            | SocketPacket::BinaryAck { attachments, .. } => *attachments,
            _ => 0,
        };

        self.buffers.push(data);
        if self.buffers.len() < expected {
            return None;
        }

        let mut packet = self.pending.take()?;
        let buffers = std::mem::take(&mut self.buffers);
        if let SocketPacket::BinaryEvent { data, .. } | SocketPacket::BinaryAck { data, .. } =
            &mut packet
        {
            fill_placeholders(data, &buffers);
        }
        Some(packet)
    }
}

fn fill_placeholders(value: &mut Value, buffers: &[Vec<u8>]) {
    match value {
        Value::Object(map) if map.get("_placeholder") == Some(&Value::Bool(true)) => {
            let buffer = map
                .get("num")
                .and_then(Value::as_u64)
                .and_then(|num| buffers.get(num as usize));
            if let Some(buffer) = buffer {
                *value = Value::String(base64::engine::general_purpose::STANDARD.encode(buffer));
            }
        }
        Value::Object(map) => map.values_mut().for_each(|v| fill_placeholders(v, buffers)),
        Value::Array(items) => items.iter_mut().for_each(|v| fill_placeholders(v, buffers)),
        _ => {}
    }
}

fn take_char(rest: &mut &str) -> Option<char> {
    let mut chars = rest.chars();
    let c = chars.next()?;
    *rest = chars.as_str();
    Some(c)
}

fn take_digits<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    let (digits, tail) = rest.split_at(end);
    *rest = tail;
    Some(digits)
}

fn ns_prefix(namespace: &str) -> String {
    if namespace.is_empty() || namespace == "/" {
        String::new()
    } else {
        format!("{},", namespace)
    }
}

fn opt_id(id: &Option<u64>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

fn opt_json(data: &Option<Value>) -> String {
    data.as_ref().map(|d| d.to_string()).unwrap_or_default()
}
