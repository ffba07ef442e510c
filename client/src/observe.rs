//! Structured sync events for whatever observability the host wires in.
//!
//! The bridge reports every state transition through [`SyncObserver`].
//! [`TracingObserver`] turns them into `tracing` records; hosts that render
//! or count events supply their own implementation.

use crate::net::types::Message;
use crate::state::conversations::Replace;

/// Why a send did not go out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendRejection {
    /// Neither text nor image.
    Empty,
    NotConnected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    Connected,
    Disconnected { reason: String },
    ConnectionFailed { reason: String },
    /// A message entered a conversation. `optimistic` marks local placeholders.
    MessageStored { key: String, message: Message, optimistic: bool },
    MessageDuplicate { key: String, id: String },
    MessageConfirmed { key: String, temp_id: String, id: String, outcome: Replace },
    /// No placeholder matched; the confirmed message was stored alongside it.
    ConfirmationUnmatched { key: String, temp_id: String, id: String },
    SendRejected { receiver_id: String, reason: SendRejection },
    TypingStarted { user_id: String, display_name: String },
    TypingStopped { user_id: String, expired: bool },
    PresenceChanged { user_id: String, online: bool },
    PresenceSnapshot { online: usize },
    HistoryLoaded { key: String, count: usize },
    ConversationSelected { key: String },
    BackendError { error: String, details: Option<String> },
}

/// Receives every bridge state transition, in order.
pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent);
}

/// Logs sync events through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::Connected => tracing::info!("sync: connected"),
            SyncEvent::Disconnected { reason } => tracing::info!(%reason, "sync: disconnected"),
            SyncEvent::ConnectionFailed { reason } => tracing::warn!(%reason, "sync: connection failed"),
            SyncEvent::MessageStored { key, message, optimistic } => {
                tracing::debug!(%key, id = %message.id, optimistic, "sync: message stored");
            }
            SyncEvent::MessageDuplicate { key, id } => tracing::debug!(%key, %id, "sync: duplicate message"),
            SyncEvent::MessageConfirmed { key, temp_id, id, outcome } => {
                tracing::debug!(%key, %temp_id, %id, ?outcome, "sync: message confirmed");
            }
            SyncEvent::ConfirmationUnmatched { key, temp_id, id } => {
                tracing::warn!(%key, %temp_id, %id, "sync: confirmation matched no placeholder");
            }
            SyncEvent::SendRejected { receiver_id, reason } => {
                tracing::warn!(%receiver_id, ?reason, "sync: send rejected");
            }
            SyncEvent::TypingStarted { user_id, .. } => tracing::trace!(%user_id, "sync: typing started"),
            SyncEvent::TypingStopped { user_id, expired } => {
                tracing::trace!(%user_id, expired, "sync: typing stopped");
            }
            SyncEvent::PresenceChanged { user_id, online } => {
                tracing::debug!(%user_id, online, "sync: presence changed");
            }
            SyncEvent::PresenceSnapshot { online } => tracing::debug!(online, "sync: presence snapshot"),
            SyncEvent::HistoryLoaded { key, count } => tracing::debug!(%key, count, "sync: history loaded"),
            SyncEvent::ConversationSelected { key } => tracing::debug!(%key, "sync: conversation selected"),
            SyncEvent::BackendError { error, details } => {
                tracing::warn!(%error, details = details.as_deref().unwrap_or_default(), "sync: backend error");
            }
        }
    }
}
