//! Synchronization bridge between the realtime transport and local state.
//!
//! DESIGN
//! ======
//! The bridge is the only writer of the [`ConversationStore`] and the
//! [`PresenceTracker`]. Transport events and UI intents are applied one at a
//! time, in arrival order, on whichever task owns the bridge; readers borrow
//! the state through accessors between mutations.
//!
//! OPTIMISTIC SENDS
//! ================
//! A send inserts a placeholder (`temp-<millis>`) before the outbound event is
//! emitted, and the event carries a fresh `clientMessageId`. The confirmation
//! is linked back by that key when the backend echoes it, otherwise by
//! re-deriving the temporary id from the confirmed `createdAt`. When neither
//! matches, the confirmed message is stored next to the placeholder.

#[cfg(test)]
#[path = "bridge_test.rs"]
mod bridge_test;

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::net::events::{OutboundEvent, SendPayload, TransportEvent};
use crate::net::transport::Realtime;
use crate::net::types::{Message, User, temp_id_for};
use crate::observe::{SendRejection, SyncEvent, SyncObserver};
use crate::state::conversations::{ConversationStore, Replace, Upsert};
use crate::state::presence::PresenceTracker;
use crate::util::day_groups::{DayGroup, group_by_day};

/// Result of [`SyncBridge::send_message`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Placeholder stored and the send emitted.
    Sent { temp_id: String },
    Rejected(SendRejection),
}

/// UI requests processed by [`SyncBridge::run`].
#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
    Send { receiver_id: String, text: Option<String>, image: Option<String> },
    StartTyping { receiver_id: String },
    StopTyping { receiver_id: String },
    Select { key: String },
    LoadHistory { key: String, messages: Vec<Message> },
    SetUsers(Vec<User>),
    Shutdown,
}

pub struct SyncBridge<R> {
    realtime: R,
    user_id: String,
    store: ConversationStore,
    presence: PresenceTracker,
    active: Option<String>,
    observer: Arc<dyn SyncObserver>,
}

impl<R: Realtime> SyncBridge<R> {
    #[must_use]
    pub fn new(
        realtime: R,
        user_id: impl Into<String>,
        presence: PresenceTracker,
        observer: Arc<dyn SyncObserver>,
    ) -> Self {
        Self {
            realtime,
            user_id: user_id.into(),
            store: ConversationStore::new(),
            presence,
            active: None,
            observer,
        }
    }

    // =========================================================================
    // READ ACCESS
    // =========================================================================

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    #[must_use]
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    #[must_use]
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    #[must_use]
    pub fn realtime(&self) -> &R {
        &self.realtime
    }

    pub fn realtime_mut(&mut self) -> &mut R {
        &mut self.realtime
    }

    /// Messages for `key` grouped by day as seen at `now`.
    #[must_use]
    pub fn grouped(&self, key: &str, now: OffsetDateTime) -> Vec<DayGroup<'_>> {
        group_by_day(self.store.messages(key), now)
    }

    #[must_use]
    pub fn next_typing_deadline(&self) -> Option<Instant> {
        self.presence.next_deadline()
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Apply one transport event.
    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Connected => self.notify(SyncEvent::Connected),
            TransportEvent::Disconnected { reason } => {
                self.presence.clear();
                self.notify(SyncEvent::Disconnected { reason });
            }
            TransportEvent::ConnectionError { reason } => self.notify(SyncEvent::ConnectionFailed { reason }),
            TransportEvent::MessageReceived(message) => self.receive(message),
            TransportEvent::MessageSendConfirmed(message) => self.confirm(message),
            TransportEvent::TypingStarted { sender_id, sender_name, receiver_id } => {
                let display_name = if sender_name.trim().is_empty() {
                    self.store.user(&sender_id).map_or_else(|| sender_id.clone(), User::display_name)
                } else {
                    sender_name
                };
                self.presence.start_typing(&sender_id, &display_name, &receiver_id, now);
                self.notify(SyncEvent::TypingStarted { user_id: sender_id, display_name });
            }
            TransportEvent::TypingStopped { sender_id } => {
                if self.presence.stop_typing(&sender_id) {
                    self.notify(SyncEvent::TypingStopped { user_id: sender_id, expired: false });
                }
            }
            TransportEvent::PresenceChanged { user_id, online } => {
                let changed =
                    if online { self.presence.mark_online(&user_id) } else { self.presence.mark_offline(&user_id) };
                if changed {
                    self.notify(SyncEvent::PresenceChanged { user_id, online });
                }
            }
            TransportEvent::PresenceSnapshot { user_ids } => {
                self.presence.set_online(user_ids);
                self.notify(SyncEvent::PresenceSnapshot { online: self.presence.online().len() });
            }
            TransportEvent::Error { error, details } => self.notify(SyncEvent::BackendError { error, details }),
        }
    }

    fn receive(&mut self, message: Message) {
        let key = message.partner_of(&self.user_id).to_owned();
        let inbound = message.sender_id != self.user_id;

        match self.store.upsert_message(&key, message.clone()) {
            Upsert::Inserted => {
                if inbound && self.active.as_deref() != Some(key.as_str()) {
                    self.store.increment_unread(&key);
                }
                self.notify(SyncEvent::MessageStored { key, message, optimistic: false });
            }
            Upsert::Duplicate => self.notify(SyncEvent::MessageDuplicate { key, id: message.id }),
        }
    }

    fn confirm(&mut self, message: Message) {
        let key = message.partner_of(&self.user_id).to_owned();
        let derived = temp_id_for(message.created_at);
        let echoed = message.client_message_id.as_deref().and_then(|client_id| {
            self.store
                .messages(&key)
                .iter()
                .find(|m| m.is_placeholder() && m.client_message_id.as_deref() == Some(client_id))
                .map(|m| m.id.clone())
        });

        let mut candidates = echoed.into_iter().chain(std::iter::once(derived.clone()));
        let matched = candidates.find_map(|temp_id| {
            match self.store.replace_message(&key, &temp_id, message.clone()) {
                Replace::NotFound => None,
                outcome => Some((temp_id, outcome)),
            }
        });

        match matched {
            Some((temp_id, outcome)) => {
                self.notify(SyncEvent::MessageConfirmed { key, temp_id, id: message.id, outcome });
            }
            None => {
                let id = message.id.clone();
                if self.store.upsert_message(&key, message.clone()) == Upsert::Inserted {
                    self.notify(SyncEvent::MessageStored { key: key.clone(), message, optimistic: false });
                }
                self.notify(SyncEvent::ConfirmationUnmatched { key, temp_id: derived, id });
            }
        }
    }

    /// Drop typing entries whose deadline passed. Returns the expired ids.
    pub fn expire_typing(&mut self, now: Instant) -> Vec<String> {
        let expired = self.presence.expire(now);
        for user_id in &expired {
            self.notify(SyncEvent::TypingStopped { user_id: user_id.clone(), expired: true });
        }
        expired
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Optimistically store and emit a message.
    ///
    /// Blank text and empty images count as absent; a send with neither, or
    /// while disconnected, changes nothing.
    pub fn send_message(
        &mut self,
        receiver_id: &str,
        text: Option<String>,
        image: Option<String>,
        now: OffsetDateTime,
    ) -> SendOutcome {
        let text = text.filter(|t| !t.trim().is_empty());
        let image = image.filter(|i| !i.is_empty());

        if text.is_none() && image.is_none() {
            return self.reject(receiver_id, SendRejection::Empty);
        }
        if !self.realtime.is_connected() {
            return self.reject(receiver_id, SendRejection::NotConnected);
        }

        let mut placeholder = Message::placeholder(&self.user_id, receiver_id, text, image, now);
        self.disambiguate(receiver_id, &mut placeholder);
        let temp_id = placeholder.id.clone();

        let payload = SendPayload {
            receiver_id: receiver_id.to_owned(),
            text: placeholder.text.clone(),
            image: placeholder.image.clone(),
            client_message_id: placeholder.client_message_id.clone(),
        };
        self.store.upsert_message(receiver_id, placeholder.clone());
        self.notify(SyncEvent::MessageStored { key: receiver_id.to_owned(), message: placeholder, optimistic: true });

        if !self.realtime.emit(OutboundEvent::SendPrivateMessage(payload)) {
            warn!(%receiver_id, %temp_id, "bridge: send could not be queued");
        }
        SendOutcome::Sent { temp_id }
    }

    /// Two sends in the same millisecond would share a temp id.
    fn disambiguate(&self, key: &str, placeholder: &mut Message) {
        let messages = self.store.messages(key);
        if !messages.iter().any(|m| m.id == placeholder.id) {
            return;
        }
        let base = placeholder.id.clone();
        let mut n = 1_u32;
        while messages.iter().any(|m| m.id == format!("{base}-{n}")) {
            n += 1;
        }
        placeholder.id = format!("{base}-{n}");
    }

    fn reject(&self, receiver_id: &str, reason: SendRejection) -> SendOutcome {
        self.notify(SyncEvent::SendRejected { receiver_id: receiver_id.to_owned(), reason });
        SendOutcome::Rejected(reason)
    }

    /// Returns whether the event was emitted.
    pub fn start_typing(&self, receiver_id: &str) -> bool {
        self.emit_when_connected(OutboundEvent::StartTyping { receiver_id: receiver_id.to_owned() })
    }

    /// Returns whether the event was emitted.
    pub fn stop_typing(&self, receiver_id: &str) -> bool {
        self.emit_when_connected(OutboundEvent::StopTyping { receiver_id: receiver_id.to_owned() })
    }

    fn emit_when_connected(&self, event: OutboundEvent) -> bool {
        if !self.realtime.is_connected() {
            debug!(event = event.name(), "bridge: not connected, skipping");
            return false;
        }
        self.realtime.emit(event)
    }

    // =========================================================================
    // VIEW STATE
    // =========================================================================

    /// Make `key` the open conversation and clear its unread count.
    pub fn select_conversation(&mut self, key: &str) {
        self.active = Some(key.to_owned());
        self.store.mark_read(key);
        self.notify(SyncEvent::ConversationSelected { key: key.to_owned() });
    }

    /// Install fetched history for `key`, replacing what was there.
    pub fn load_history(&mut self, key: &str, messages: Vec<Message>) {
        let count = messages.len();
        self.store.set_snapshot(key, messages);
        self.notify(SyncEvent::HistoryLoaded { key: key.to_owned(), count });
    }

    pub fn set_users(&mut self, users: Vec<User>) {
        self.store.set_users(users);
    }

    /// Apply one UI intent. Returns `false` for [`Intent::Shutdown`].
    pub fn apply(&mut self, intent: Intent) -> bool {
        match intent {
            Intent::Send { receiver_id, text, image } => {
                self.send_message(&receiver_id, text, image, OffsetDateTime::now_utc());
            }
            Intent::StartTyping { receiver_id } => {
                self.start_typing(&receiver_id);
            }
            Intent::StopTyping { receiver_id } => {
                self.stop_typing(&receiver_id);
            }
            Intent::Select { key } => self.select_conversation(&key),
            Intent::LoadHistory { key, messages } => self.load_history(&key, messages),
            Intent::SetUsers(users) => self.set_users(users),
            Intent::Shutdown => return false,
        }
        true
    }

    /// Process transport events, intents and typing expiry until the intent
    /// channel closes or [`Intent::Shutdown`] arrives.
    pub async fn run(
        &mut self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
        mut intents: mpsc::UnboundedReceiver<Intent>,
    ) {
        loop {
            let deadline = self.presence.next_deadline();
            tokio::select! {
                Some(event) = events.recv() => self.handle_event(event, Instant::now()),
                intent = intents.recv() => {
                    let Some(intent) = intent else { break };
                    if !self.apply(intent) {
                        break;
                    }
                }
                () = wait_until(deadline) => {
                    self.expire_typing(Instant::now());
                }
            }
        }
        debug!("bridge: stopped");
    }

    fn notify(&self, event: SyncEvent) {
        self.observer.on_event(&event);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
