//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Only the text framing is handled; binary attachments are recognized and
//! skipped by the client.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors decoding a text frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("empty frame")]
    Empty,
    #[error("unknown {layer} packet type {kind:?}")]
    UnknownType { layer: &'static str, kind: char },
    #[error("invalid packet payload: {0}")]
    Payload(String),
}

/// Handshake sent by the server in the Engine.IO OPEN packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Server ping period in milliseconds
    pub ping_interval: u64,
    /// Grace period after a missed ping in milliseconds
    pub ping_timeout: u64,
}

/// Engine.IO transport packet.
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// Socket.IO packet carried inside an Engine.IO MESSAGE.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect { namespace: String, sid: Option<String> },
    Disconnect { namespace: String },
    Event { namespace: String, ack_id: Option<u64>, name: String, args: Vec<Value> },
    Ack { namespace: String, ack_id: Option<u64>, args: Vec<Value> },
    ConnectError { namespace: String, message: String },
    /// Event or ack with binary attachments following in separate frames
    Binary { namespace: String, attachments: usize },
}

/// Decode one Engine.IO text frame.
pub fn decode(frame: &str) -> Result<EnginePacket, PacketError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    let rest = chars.as_str();

    match kind {
        '0' => serde_json::from_str(rest)
            .map(EnginePacket::Open)
            .map_err(|e| PacketError::Payload(e.to_string())),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(rest.to_string())),
        '3' => Ok(EnginePacket::Pong(rest.to_string())),
        '4' => decode_socket(rest).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(PacketError::UnknownType { layer: "engine.io", kind: other }),
    }
}

fn decode_socket(body: &str) -> Result<SocketPacket, PacketError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    let mut rest = chars.as_str();

    let mut attachments = 0;
    if matches!(kind, '5' | '6') {
        let (count, tail) = rest
            .split_once('-')
            .ok_or_else(|| PacketError::Payload("missing attachment count".to_string()))?;
        attachments = count
            .parse()
            .map_err(|_| PacketError::Payload(format!("bad attachment count {:?}", count)))?;
        rest = tail;
    }

    let namespace = if rest.starts_with('/') {
        let (ns, tail) = rest.split_once(',').unwrap_or((rest, ""));
        rest = tail;
        ns.to_string()
    } else {
        "/".to_string()
    };

    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let ack_id = if digits > 0 { rest[..digits].parse().ok() } else { None };
    let payload = &rest[digits..];

    match kind {
        '0' => Ok(SocketPacket::Connect {
            namespace,
            sid: parse_json(payload)?
                .as_ref()
                .and_then(|v| v.get("sid"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let mut args = match parse_json(payload)? {
                Some(Value::Array(items)) => items,
                _ => return Err(PacketError::Payload("event payload is not an array".to_string())),
            };
            if args.is_empty() {
                return Err(PacketError::Payload("event without a name".to_string()));
            }
            let name = match args.remove(0) {
                Value::String(name) => name,
                other => return Err(PacketError::Payload(format!("event name is not a string: {}", other))),
            };
            Ok(SocketPacket::Event { namespace, ack_id, name, args })
        }
        '3' => {
            let args = match parse_json(payload)? {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            Ok(SocketPacket::Ack { namespace, ack_id, args })
        }
        '4' => {
            let message = match parse_json(payload)? {
                Some(Value::Object(map)) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("connection refused")
                    .to_string(),
                Some(Value::String(message)) => message,
                _ => "connection refused".to_string(),
            };
            Ok(SocketPacket::ConnectError { namespace, message })
        }
        '5' | '6' => Ok(SocketPacket::Binary { namespace, attachments }),
        other => Err(PacketError::UnknownType { layer: "socket.io", kind: other }),
    }
}

fn parse_json(payload: &str) -> Result<Option<Value>, PacketError> {
    if payload.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(payload)
        .map(Some)
        .map_err(|e| PacketError::Payload(e.to_string()))
}

/// Frame joining `namespace`.
pub fn encode_connect(namespace: &str) -> String {
    if namespace == "/" {
        "40".to_string()
    } else {
        format!("40{},", namespace)
    }
}

/// Reply to a server ping, echoing its probe payload.
pub fn encode_pong(payload: &str) -> String {
    format!("3{}", payload)
}

/// Event frame on the default namespace.
pub fn encode_event(name: &str, args: &[Value]) -> String {
    let mut items = Vec::with_capacity(args.len() + 1);
    items.push(Value::String(name.to_string()));
    items.extend(args.iter().cloned());
    format!("42{}", Value::Array(items))
}
