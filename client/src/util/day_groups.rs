//! Chronological, day-labelled view of a conversation.
//!
//! A pure projection: the stored list is never reordered, and grouping the
//! same list against the same clock always yields the same output.

#[cfg(test)]
#[path = "day_groups_test.rs"]
mod day_groups_test;

use std::fmt;

use time::{Date, OffsetDateTime, UtcOffset};

use crate::net::types::Message;

/// Heading for one day's worth of messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DayLabel {
    Today,
    Yesterday,
    Date(Date),
}

impl DayLabel {
    /// Label `date` relative to `today`.
    #[must_use]
    pub fn for_date(date: Date, today: Date) -> Self {
        if date == today {
            Self::Today
        } else if today.previous_day() == Some(date) {
            Self::Yesterday
        } else {
            Self::Date(date)
        }
    }
}

impl fmt::Display for DayLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Today => f.write_str("Today"),
            Self::Yesterday => f.write_str("Yesterday"),
            Self::Date(date) => write!(f, "{} {}, {}", date.month(), date.day(), date.year()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DayGroup<'a> {
    pub label: DayLabel,
    pub date: Date,
    pub messages: Vec<&'a Message>,
}

/// Sort `messages` by creation time (stable) and split them into calendar
/// days in `now`'s offset.
#[must_use]
pub fn group_by_day(messages: &[Message], now: OffsetDateTime) -> Vec<DayGroup<'_>> {
    let offset = now.offset();
    let today = now.date();

    let mut sorted: Vec<&Message> = messages.iter().collect();
    sorted.sort_by_key(|m| m.created_at);

    let mut groups: Vec<DayGroup<'_>> = Vec::new();
    for message in sorted {
        let date = local_date(message.created_at, offset);
        match groups.last_mut() {
            Some(group) if group.date == date => group.messages.push(message),
            _ => groups.push(DayGroup { label: DayLabel::for_date(date, today), date, messages: vec![message] }),
        }
    }
    groups
}

/// `HH:MM` in `offset`, for message timestamps.
#[must_use]
pub fn clock_time(at: OffsetDateTime, offset: UtcOffset) -> String {
    let local = at.to_offset(offset);
    format!("{:02}:{:02}", local.hour(), local.minute())
}

fn local_date(at: OffsetDateTime, offset: UtcOffset) -> Date {
    at.to_offset(offset).date()
}
