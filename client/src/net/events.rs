//! Typed realtime events and their Socket.IO names.
//!
//! DESIGN
//! ======
//! The transport republishes every inbound Socket.IO event as a
//! [`TransportEvent`]; lifecycle variants (`Connected`, `Disconnected`,
//! `ConnectionError`) are produced by the transport itself. Payload decoding
//! lives here so the transport never needs to know the chat schema.
//!
//! Unknown event names decode to `None`. Known names with malformed payloads
//! decode to an [`EventError`] that the transport logs and drops.

#[cfg(test)]
#[path = "events_test.rs"]
mod events_test;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::Message;

/// Socket.IO event names used by the chat backend.
pub mod names {
    pub const NEW_PRIVATE_MESSAGE: &str = "newPrivateMessage";
    pub const MESSAGE_SENT: &str = "messageSent";
    pub const USER_STARTED_TYPING: &str = "userStartedTyping";
    pub const USER_STOPPED_TYPING: &str = "userStoppedTyping";
    pub const USER_ONLINE: &str = "userOnline";
    pub const USER_OFFLINE: &str = "userOffline";
    pub const GET_ONLINE_USERS: &str = "getOnlineUsers";
    pub const USER_STATUS: &str = "userStatus";
    pub const MESSAGE_ERROR: &str = "messageError";

    pub const SEND_PRIVATE_MESSAGE: &str = "sendPrivateMessage";
    pub const START_TYPING: &str = "startTyping";
    pub const STOP_TYPING: &str = "stopTyping";
}

/// Error decoding the payload of a known event.
#[derive(Debug, thiserror::Error)]
#[error("invalid `{event}` payload: {source}")]
pub struct EventError {
    pub event: &'static str,
    #[source]
    pub source: serde_json::Error,
}

// =============================================================================
// INBOUND
// =============================================================================

/// Everything the transport session publishes, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: String },
    ConnectionError { reason: String },
    MessageReceived(Message),
    MessageSendConfirmed(Message),
    TypingStarted { sender_id: String, sender_name: String, receiver_id: String },
    TypingStopped { sender_id: String },
    PresenceChanged { user_id: String, online: bool },
    PresenceSnapshot { user_ids: Vec<String> },
    Error { error: String, details: Option<String> },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingStartedPayload {
    sender_id: String,
    #[serde(default)]
    sender_name: Option<String>,
    #[serde(default)]
    receiver_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingStoppedPayload {
    sender_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserIdPayload {
    user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserStatusPayload {
    user_id: String,
    is_online: bool,
}

/// Entries of `getOnlineUsers`: full user documents or bare ids.
#[derive(Deserialize)]
#[serde(untagged)]
enum OnlineEntry {
    Id(String),
    Doc {
        #[serde(rename = "_id", alias = "userId", alias = "id")]
        id: String,
    },
}

#[derive(Deserialize)]
struct MessageErrorPayload {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<Value>,
}

impl TransportEvent {
    /// Decode a Socket.IO event by name.
    ///
    /// Returns `Ok(None)` for events this client does not handle.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] when a known event carries a malformed payload.
    pub fn decode(name: &str, args: &[Value]) -> Result<Option<Self>, EventError> {
        let payload = args.first().cloned().unwrap_or(Value::Null);

        let event = match name {
            names::NEW_PRIVATE_MESSAGE => {
                Self::MessageReceived(parse(names::NEW_PRIVATE_MESSAGE, payload)?)
            }
            names::MESSAGE_SENT => Self::MessageSendConfirmed(parse(names::MESSAGE_SENT, payload)?),
            names::USER_STARTED_TYPING => {
                let p: TypingStartedPayload = parse(names::USER_STARTED_TYPING, payload)?;
                Self::TypingStarted {
                    sender_name: p.sender_name.unwrap_or_default(),
                    receiver_id: p.receiver_id.unwrap_or_default(),
                    sender_id: p.sender_id,
                }
            }
            names::USER_STOPPED_TYPING => {
                let p: TypingStoppedPayload = parse(names::USER_STOPPED_TYPING, payload)?;
                Self::TypingStopped { sender_id: p.sender_id }
            }
            names::USER_ONLINE => {
                let p: UserIdPayload = parse(names::USER_ONLINE, payload)?;
                Self::PresenceChanged { user_id: p.user_id, online: true }
            }
            names::USER_OFFLINE => {
                let p: UserIdPayload = parse(names::USER_OFFLINE, payload)?;
                Self::PresenceChanged { user_id: p.user_id, online: false }
            }
            names::USER_STATUS => {
                let p: UserStatusPayload = parse(names::USER_STATUS, payload)?;
                Self::PresenceChanged { user_id: p.user_id, online: p.is_online }
            }
            names::GET_ONLINE_USERS => {
                let entries: Vec<OnlineEntry> = parse(names::GET_ONLINE_USERS, payload)?;
                let user_ids = entries
                    .into_iter()
                    .map(|entry| match entry {
                        OnlineEntry::Id(id) | OnlineEntry::Doc { id } => id,
                    })
                    .collect();
                Self::PresenceSnapshot { user_ids }
            }
            names::MESSAGE_ERROR => {
                let p: MessageErrorPayload = parse(names::MESSAGE_ERROR, payload)?;
                Self::Error {
                    error: p.error.unwrap_or_else(|| "unknown error".to_owned()),
                    details: p.details.map(|d| match d {
                        Value::String(s) => s,
                        other => other.to_string(),
                    }),
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }
}

fn parse<T: DeserializeOwned>(event: &'static str, payload: Value) -> Result<T, EventError> {
    serde_json::from_value(payload).map_err(|source| EventError { event, source })
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Events the client emits to the backend.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundEvent {
    SendPrivateMessage(SendPayload),
    StartTyping { receiver_id: String },
    StopTyping { receiver_id: String },
}

/// Payload of `sendPrivateMessage`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    pub receiver_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Placeholder id, for backends that echo it on `messageSent`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TypingPayload<'a> {
    receiver_id: &'a str,
}

impl OutboundEvent {
    /// Socket.IO event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendPrivateMessage(_) => names::SEND_PRIVATE_MESSAGE,
            Self::StartTyping { .. } => names::START_TYPING,
            Self::StopTyping { .. } => names::STOP_TYPING,
        }
    }

    /// JSON argument sent with the event.
    #[must_use]
    pub fn payload(&self) -> Value {
        let value = match self {
            Self::SendPrivateMessage(payload) => serde_json::to_value(payload),
            Self::StartTyping { receiver_id } | Self::StopTyping { receiver_id } => {
                serde_json::to_value(TypingPayload { receiver_id })
            }
        };
        // Plain string-field structs always serialize.
        value.unwrap_or(Value::Null)
    }

    /// Encode into a Socket.IO event packet.
    #[must_use]
    pub fn to_packet(&self) -> frames::SocketPacket {
        frames::SocketPacket::event(self.name(), self.payload())
    }
}
