//! Packet model and text codec for the realtime channel.
//!
//! The backend speaks Socket.IO v5 on top of Engine.IO v4. Every websocket
//! text message is one Engine.IO packet; Engine.IO `message` packets carry a
//! Socket.IO packet as their payload. This crate owns both layers so the
//! transport can stay focused on connection lifecycle.
//!
//! Binary attachments (`BINARY_EVENT` / `BINARY_ACK`) are not supported; the
//! chat backend only emits JSON payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace used when a packet does not name one.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Error returned by [`decode_packet`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The websocket message was empty.
    #[error("empty packet")]
    Empty,
    /// The leading character is not a known Engine.IO packet type.
    #[error("unknown engine packet type: {0:?}")]
    UnknownEngineType(char),
    /// The Socket.IO packet type digit is not known.
    #[error("unknown socket packet type: {0:?}")]
    UnknownSocketType(char),
    /// Binary Socket.IO packets are not handled by this codec.
    #[error("binary socket packets are not supported")]
    BinaryUnsupported,
    /// The Engine.IO open packet carried an unreadable handshake.
    #[error("invalid handshake: {0}")]
    InvalidHandshake(serde_json::Error),
    /// A JSON payload could not be parsed.
    #[error("invalid packet payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    /// An event packet did not start with a string event name.
    #[error("event packet is missing its name")]
    MissingEventName,
    /// The acknowledgment id digits overflowed.
    #[error("invalid ack id")]
    InvalidAckId,
}

// =============================================================================
// ENGINE LAYER
// =============================================================================

/// Session parameters sent by the server in the Engine.IO `open` packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session id.
    pub sid: String,
    /// Transports the server would accept an upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    /// Largest payload the server accepts, in bytes.
    #[serde(default)]
    pub max_payload: u64,
}

/// One Engine.IO packet, with `message` payloads already decoded.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

// =============================================================================
// SOCKET LAYER
// =============================================================================

/// One Socket.IO packet.
#[derive(Clone, Debug, PartialEq)]
pub enum SocketPacket {
    /// Client: join a namespace with optional auth data. Server: accepted, with `{sid}`.
    Connect { namespace: String, data: Option<Value> },
    /// Either side leaves the namespace.
    Disconnect { namespace: String },
    /// Named event with arguments.
    Event { namespace: String, ack_id: Option<u64>, name: String, args: Vec<Value> },
    /// Acknowledgment of an earlier event.
    Ack { namespace: String, ack_id: u64, args: Vec<Value> },
    /// The server refused the namespace connection (e.g. bad credentials).
    ConnectError { namespace: String, data: Value },
}

impl SocketPacket {
    /// Connect to the default namespace, passing `auth` as the handshake payload.
    #[must_use]
    pub fn connect(auth: Option<Value>) -> Self {
        Self::Connect { namespace: DEFAULT_NAMESPACE.to_owned(), data: auth }
    }

    /// Event on the default namespace with a single payload argument.
    #[must_use]
    pub fn event(name: &str, payload: Value) -> Self {
        Self::Event { namespace: DEFAULT_NAMESPACE.to_owned(), ack_id: None, name: name.to_owned(), args: vec![payload] }
    }

    #[must_use]
    pub fn disconnect() -> Self {
        Self::Disconnect { namespace: DEFAULT_NAMESPACE.to_owned() }
    }

    fn type_digit(&self) -> char {
        match self {
            Self::Connect { .. } => '0',
            Self::Disconnect { .. } => '1',
            Self::Event { .. } => '2',
            Self::Ack { .. } => '3',
            Self::ConnectError { .. } => '4',
        }
    }

    fn namespace(&self) -> &str {
        match self {
            Self::Connect { namespace, .. }
            | Self::Disconnect { namespace }
            | Self::Event { namespace, .. }
            | Self::Ack { namespace, .. }
            | Self::ConnectError { namespace, .. } => namespace,
        }
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// Encode a packet into the text form sent over the websocket.
#[must_use]
pub fn encode_packet(packet: &Packet) -> String {
    match packet {
        Packet::Open(handshake) => {
            // Serializing a struct of strings and integers cannot fail.
            format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
        }
        Packet::Close => "1".to_owned(),
        Packet::Ping => "2".to_owned(),
        Packet::Pong => "3".to_owned(),
        Packet::Message(socket) => format!("4{}", encode_socket(socket)),
        Packet::Upgrade => "5".to_owned(),
        Packet::Noop => "6".to_owned(),
    }
}

/// Decode one websocket text message.
///
/// # Errors
///
/// Returns a [`CodecError`] for unknown packet types, binary Socket.IO
/// packets, and malformed JSON payloads.
pub fn decode_packet(text: &str) -> Result<Packet, CodecError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();

    match kind {
        '0' => serde_json::from_str(rest)
            .map(Packet::Open)
            .map_err(CodecError::InvalidHandshake),
        '1' => Ok(Packet::Close),
        // Ping/pong may carry a probe payload during transport upgrade; it is ignored.
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket(rest).map(Packet::Message),
        '5' => Ok(Packet::Upgrade),
        '6' => Ok(Packet::Noop),
        other => Err(CodecError::UnknownEngineType(other)),
    }
}

fn encode_socket(packet: &SocketPacket) -> String {
    let mut out = String::new();
    out.push(packet.type_digit());

    let namespace = packet.namespace();
    if namespace != DEFAULT_NAMESPACE {
        out.push_str(namespace);
        out.push(',');
    }

    match packet {
        SocketPacket::Connect { data, .. } => {
            if let Some(data) = data {
                out.push_str(&data.to_string());
            }
        }
        SocketPacket::Disconnect { .. } => {}
        SocketPacket::Event { ack_id, name, args, .. } => {
            if let Some(id) = ack_id {
                out.push_str(&id.to_string());
            }
            let mut items = Vec::with_capacity(args.len() + 1);
            items.push(Value::String(name.clone()));
            items.extend(args.iter().cloned());
            out.push_str(&Value::Array(items).to_string());
        }
        SocketPacket::Ack { ack_id, args, .. } => {
            out.push_str(&ack_id.to_string());
            out.push_str(&Value::Array(args.clone()).to_string());
        }
        SocketPacket::ConnectError { data, .. } => out.push_str(&data.to_string()),
    }

    out
}

fn decode_socket(text: &str) -> Result<SocketPacket, CodecError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let mut rest = chars.as_str();

    if matches!(kind, '5' | '6') {
        return Err(CodecError::BinaryUnsupported);
    }

    let namespace = if rest.starts_with('/') {
        let end = rest.find(',').unwrap_or(rest.len());
        let ns = rest[..end].to_owned();
        rest = rest.get(end + 1..).unwrap_or("");
        ns
    } else {
        DEFAULT_NAMESPACE.to_owned()
    };

    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    let ack_id = if digits > 0 {
        Some(rest[..digits].parse::<u64>().map_err(|_| CodecError::InvalidAckId)?)
    } else {
        None
    };
    let body = &rest[digits..];

    match kind {
        '0' => {
            let data = if body.is_empty() { None } else { Some(serde_json::from_str(body)?) };
            Ok(SocketPacket::Connect { namespace, data })
        }
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let mut items = parse_args(body)?;
            if items.is_empty() {
                return Err(CodecError::MissingEventName);
            }
            let Value::String(name) = items.remove(0) else {
                return Err(CodecError::MissingEventName);
            };
            Ok(SocketPacket::Event { namespace, ack_id, name, args: items })
        }
        '3' => Ok(SocketPacket::Ack {
            namespace,
            ack_id: ack_id.ok_or(CodecError::InvalidAckId)?,
            args: parse_args(body)?,
        }),
        '4' => {
            let data = if body.is_empty() { Value::Null } else { serde_json::from_str(body)? };
            Ok(SocketPacket::ConnectError { namespace, data })
        }
        other => Err(CodecError::UnknownSocketType(other)),
    }
}

fn parse_args(body: &str) -> Result<Vec<Value>, CodecError> {
    if body.is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(body)? {
        Value::Array(items) => Ok(items),
        other => Ok(vec![other]),
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
