//! Identifier newtypes shared across the bot.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque channel identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

/// Opaque user identifier, also used as the mention rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Opaque message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

/// A resolved, deliverable channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub channel: ChannelId,
    /// Display name, for log context.
    pub name: String,
}

/// A user command, already parsed by the transport.
///
/// The transport owns the surface syntax (slash commands, prefixes, console
/// lines); the bot core starts from these structured arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    /// Schedule an event in a channel at a user-supplied time.
    ScheduleEvent {
        channel: ChannelId,
        requester: UserId,
        title: String,
        /// The time as the user typed it.
        when: String,
    },
    /// Sign up for an event by its job id.
    SignUp { requester: UserId, job_id: String },
    /// Cancel an event by its job id.
    Cancel { requester: UserId, job_id: String },
    /// Open a poll in a channel, to be resolved after a duration.
    CreatePoll {
        channel: ChannelId,
        requester: UserId,
        topic: String,
        /// The duration as the user typed it.
        duration: String,
        options: Vec<String>,
    },
}

impl CommandEvent {
    /// Who issued the command; error replies go back to them.
    pub fn requester(&self) -> &UserId {
        match self {
            CommandEvent::ScheduleEvent { requester, .. }
            | CommandEvent::SignUp { requester, .. }
            | CommandEvent::Cancel { requester, .. }
            | CommandEvent::CreatePoll { requester, .. } => requester,
        }
    }
}

/// One row of the birthday list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub name: String,
    /// `None` when the upstream row had no parseable date.
    pub born: Option<NaiveDate>,
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
