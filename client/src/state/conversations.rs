//! Per-conversation message lists keyed by the other participant.
//!
//! DESIGN
//! ======
//! Lists are append-ordered, not time-ordered: the store never re-sorts.
//! Chronological order is a read-time projection (see
//! [`crate::util::day_groups`]). Identifiers are unique per conversation;
//! every mutation preserves that.

#[cfg(test)]
#[path = "conversations_test.rs"]
mod conversations_test;

use std::collections::{HashMap, HashSet};

use time::OffsetDateTime;

use crate::net::types::{Message, User};

/// Result of [`ConversationStore::upsert_message`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Duplicate,
}

/// Result of [`ConversationStore::replace_message`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Replace {
    /// The placeholder now carries the confirmed message.
    Replaced,
    /// The confirmed id was already present, so the placeholder was dropped.
    Merged,
    /// No entry had the temporary id.
    NotFound,
}

/// One 1:1 conversation.
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    pub messages: Vec<Message>,
    pub unread: u32,
    pub last_activity: Option<OffsetDateTime>,
}

impl Conversation {
    fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    fn touch(&mut self, at: OffsetDateTime) {
        if self.last_activity.is_none_or(|prev| at > prev) {
            self.last_activity = Some(at);
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConversationStore {
    conversations: HashMap<String, Conversation>,
    users: Vec<User>,
}

impl ConversationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message` unless its id is already in the conversation.
    pub fn upsert_message(&mut self, key: &str, message: Message) -> Upsert {
        let conversation = self.conversations.entry(key.to_owned()).or_default();
        if conversation.contains(&message.id) {
            return Upsert::Duplicate;
        }
        conversation.touch(message.created_at);
        conversation.messages.push(message);
        Upsert::Inserted
    }

    /// Overwrite the placeholder `temp_id` with the confirmed message.
    pub fn replace_message(&mut self, key: &str, temp_id: &str, confirmed: Message) -> Replace {
        let Some(conversation) = self.conversations.get_mut(key) else {
            return Replace::NotFound;
        };
        let Some(index) = conversation.messages.iter().position(|m| m.id == temp_id) else {
            return Replace::NotFound;
        };

        conversation.touch(confirmed.created_at);
        if confirmed.id != temp_id && conversation.contains(&confirmed.id) {
            conversation.messages.remove(index);
            return Replace::Merged;
        }
        conversation.messages[index] = confirmed;
        Replace::Replaced
    }

    /// Replace the whole list for `key`, collapsing duplicate ids (first wins).
    pub fn set_snapshot(&mut self, key: &str, messages: Vec<Message>) {
        let mut seen = HashSet::with_capacity(messages.len());
        let messages: Vec<Message> = messages.into_iter().filter(|m| seen.insert(m.id.clone())).collect();

        let conversation = self.conversations.entry(key.to_owned()).or_default();
        conversation.last_activity = messages.iter().map(|m| m.created_at).max();
        conversation.messages = messages;
    }

    #[must_use]
    pub fn messages(&self, key: &str) -> &[Message] {
        self.conversations.get(key).map_or(&[], |c| c.messages.as_slice())
    }

    #[must_use]
    pub fn conversation(&self, key: &str) -> Option<&Conversation> {
        self.conversations.get(key)
    }

    #[must_use]
    pub fn unread(&self, key: &str) -> u32 {
        self.conversations.get(key).map_or(0, |c| c.unread)
    }

    pub fn increment_unread(&mut self, key: &str) {
        let conversation = self.conversations.entry(key.to_owned()).or_default();
        conversation.unread = conversation.unread.saturating_add(1);
    }

    pub fn mark_read(&mut self, key: &str) {
        if let Some(conversation) = self.conversations.get_mut(key) {
            conversation.unread = 0;
        }
    }

    #[must_use]
    pub fn total_unread(&self) -> u32 {
        self.conversations.values().map(|c| c.unread).fold(0, u32::saturating_add)
    }

    /// Replace the sidebar user directory.
    pub fn set_users(&mut self, users: Vec<User>) {
        self.users = users;
    }

    #[must_use]
    pub fn users(&self) -> &[User] {
        &self.users
    }

    #[must_use]
    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    /// Sidebar order: most recent activity first, then users without activity
    /// in directory order.
    #[must_use]
    pub fn sidebar(&self) -> Vec<&User> {
        let mut users: Vec<&User> = self.users.iter().collect();
        // Stable sort keeps directory order among ties.
        users.sort_by(|a, b| {
            let a = self.conversations.get(&a.id).and_then(|c| c.last_activity);
            let b = self.conversations.get(&b.id).and_then(|c| c.last_activity);
            b.cmp(&a)
        });
        users
    }

    pub fn clear(&mut self) {
        self.conversations.clear();
        self.users.clear();
    }
}
