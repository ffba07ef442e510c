//! Wire DTOs for the REST API and realtime channel, plus normalization.
//!
//! DESIGN
//! ======
//! Backend payloads are loose: name fields may be missing or `null`, ids may
//! arrive as bare strings or populated `{_id}` documents, and timestamps are
//! RFC 3339 strings. All of that is resolved here, once, when data enters the
//! client. Everything downstream works with fully-populated [`User`] and
//! [`Message`] values.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Prefix marking a locally synthesized message id awaiting confirmation.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Error produced when an inbound message cannot be normalized.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid timestamp in `{field}`: {value}")]
    InvalidTimestamp { field: &'static str, value: String },
}

// =============================================================================
// USER
// =============================================================================

/// A backend user, normalized so every name field is present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub first_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
}

impl User {
    /// Human-readable name: full name, else email, else id.
    #[must_use]
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if !full.is_empty() {
            return full.to_owned();
        }
        if !self.email.is_empty() {
            return self.email.clone();
        }
        self.id.clone()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// MESSAGE
// =============================================================================

/// A direct message between two users.
///
/// Deserialization goes through [`WireMessage`] so malformed payloads are
/// rejected at the boundary instead of half-populating the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "WireMessage")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Data-URI encoded image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub read: bool,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub read_at: Option<OffsetDateTime>,
    /// Idempotency key sent with the message and echoed back by backends
    /// that support it. Set on placeholders only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

impl Message {
    /// Build an optimistic placeholder for a send that has not been confirmed.
    #[must_use]
    pub fn placeholder(
        sender_id: &str,
        receiver_id: &str,
        text: Option<String>,
        image: Option<String>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: temp_id_for(now),
            client_message_id: Some(Uuid::new_v4().to_string()),
            sender_id: sender_id.to_owned(),
            receiver_id: receiver_id.to_owned(),
            text,
            image,
            created_at: now,
            updated_at: now,
            read: false,
            read_at: None,
        }
    }

    /// Whether this message still carries a locally synthesized id.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }

    /// The participant that is not `me`.
    #[must_use]
    pub fn partner_of(&self, me: &str) -> &str {
        if self.sender_id == me { &self.receiver_id } else { &self.sender_id }
    }
}

/// Derive the placeholder id for a send created at `created_at`.
///
/// Confirmation matching recomputes this from the server's timestamp, so it
/// only links up when both clocks agree to the millisecond.
#[must_use]
pub fn temp_id_for(created_at: OffsetDateTime) -> String {
    let millis = created_at.unix_timestamp_nanos() / 1_000_000;
    format!("{TEMP_ID_PREFIX}{millis}")
}

/// Either a bare id string or a populated document carrying `_id`.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRef {
    Id(String),
    Doc {
        #[serde(rename = "_id")]
        id: String,
    },
}

impl IdRef {
    fn into_id(self) -> String {
        match self {
            Self::Id(id) | Self::Doc { id } => id,
        }
    }
}

/// Message exactly as the backend sends it.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(rename = "_id")]
    id: Option<String>,
    sender_id: Option<IdRef>,
    receiver_id: Option<IdRef>,
    text: Option<String>,
    image: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
    read: Option<bool>,
    read_at: Option<String>,
    client_message_id: Option<String>,
}

impl TryFrom<WireMessage> for Message {
    type Error = NormalizeError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let id = non_empty(wire.id).ok_or(NormalizeError::MissingField("_id"))?;
        let sender_id = wire
            .sender_id
            .map(IdRef::into_id)
            .ok_or(NormalizeError::MissingField("senderId"))?;
        let receiver_id = wire
            .receiver_id
            .map(IdRef::into_id)
            .ok_or(NormalizeError::MissingField("receiverId"))?;
        let created_at = wire
            .created_at
            .as_deref()
            .map(|raw| parse_timestamp("createdAt", raw))
            .transpose()?
            .ok_or(NormalizeError::MissingField("createdAt"))?;
        let updated_at = wire
            .updated_at
            .as_deref()
            .map(|raw| parse_timestamp("updatedAt", raw))
            .transpose()?
            .unwrap_or(created_at);
        let read_at = wire
            .read_at
            .as_deref()
            .map(|raw| parse_timestamp("readAt", raw))
            .transpose()?;

        Ok(Self {
            id,
            sender_id,
            receiver_id,
            text: non_empty(wire.text),
            image: non_empty(wire.image),
            created_at,
            updated_at,
            read: wire.read.unwrap_or(false),
            read_at,
            client_message_id: non_empty(wire.client_message_id),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_timestamp(field: &'static str, raw: &str) -> Result<OffsetDateTime, NormalizeError> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|_| NormalizeError::InvalidTimestamp { field, value: raw.to_owned() })
}

// =============================================================================
// REST RESPONSES
// =============================================================================

/// Body of `POST /auth/login`.
#[derive(Clone, Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub message: String,
    pub data: User,
    pub token: String,
}

/// Body of `POST /auth/signup`. No token: the user must log in afterwards.
#[derive(Clone, Debug, Deserialize)]
pub struct SignupResponse {
    #[serde(default)]
    pub message: String,
    pub data: User,
}
