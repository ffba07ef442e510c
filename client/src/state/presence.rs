//! Online membership and typing indicators.
//!
//! Typing entries carry a deadline instead of owning a timer: the bridge
//! loop sleeps until [`PresenceTracker::next_deadline`] and then calls
//! [`PresenceTracker::expire`]. Removing an entry therefore cancels its
//! expiry with no extra bookkeeping.

#[cfg(test)]
#[path = "presence_test.rs"]
mod presence_test;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;

/// Someone currently typing to us.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypingEntry {
    pub user_id: String,
    pub display_name: String,
    /// Who they are typing to (our own id for direct messages).
    pub receiver_id: String,
    pub expires_at: Instant,
}

#[derive(Clone, Debug)]
pub struct PresenceTracker {
    online: HashSet<String>,
    typing: HashMap<String, TypingEntry>,
    typing_timeout: Duration,
}

impl PresenceTracker {
    #[must_use]
    pub fn new(typing_timeout: Duration) -> Self {
        Self { online: HashSet::new(), typing: HashMap::new(), typing_timeout }
    }

    /// Replace the online set wholesale.
    pub fn set_online<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.online = ids.into_iter().collect();
    }

    /// Returns `true` if the user was not already online.
    pub fn mark_online(&mut self, id: &str) -> bool {
        self.online.insert(id.to_owned())
    }

    /// Returns `true` if the user was online.
    pub fn mark_offline(&mut self, id: &str) -> bool {
        self.online.remove(id)
    }

    #[must_use]
    pub fn is_online(&self, id: &str) -> bool {
        self.online.contains(id)
    }

    #[must_use]
    pub fn online(&self) -> &HashSet<String> {
        &self.online
    }

    /// Insert or refresh the typing entry for `user_id`, re-arming its expiry.
    pub fn start_typing(&mut self, user_id: &str, display_name: &str, receiver_id: &str, now: Instant) {
        self.typing.insert(
            user_id.to_owned(),
            TypingEntry {
                user_id: user_id.to_owned(),
                display_name: display_name.to_owned(),
                receiver_id: receiver_id.to_owned(),
                expires_at: now + self.typing_timeout,
            },
        );
    }

    /// Remove the typing entry for `user_id`. Returns `true` if one existed.
    pub fn stop_typing(&mut self, user_id: &str) -> bool {
        self.typing.remove(user_id).is_some()
    }

    /// Drop entries whose deadline is at or before `now`, returning their user ids.
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let expired: Vec<String> = self
            .typing
            .values()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.user_id.clone())
            .collect();
        for id in &expired {
            self.typing.remove(id);
        }
        expired
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.typing.values().map(|entry| entry.expires_at).min()
    }

    #[must_use]
    pub fn typing(&self, user_id: &str) -> Option<&TypingEntry> {
        self.typing.get(user_id)
    }

    #[must_use]
    pub fn typing_count(&self) -> usize {
        self.typing.len()
    }

    /// Whether the conversation partner `user_id` is typing.
    #[must_use]
    pub fn is_typing(&self, user_id: &str) -> bool {
        self.typing.contains_key(user_id)
    }

    /// Forget all ephemeral state.
    pub fn clear(&mut self) {
        self.online.clear();
        self.typing.clear();
    }
}
