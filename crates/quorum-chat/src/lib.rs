//! Collaborator boundaries for Quorum.
//!
//! The chat transport and the birthday spreadsheet are external systems.
//! This crate defines the traits the rest of the bot programs against:
//! - [`ChatGateway`]: resolve channels, deliver messages, read reaction tallies
//! - [`CommandSource`]: the stream of parsed user commands coming in
//! - [`BirthdaySource`]: the upstream list of names and birthdates
//!
//! Absence (a deleted channel or message) is a first-class outcome at this
//! boundary, expressed as `None` rather than an error.

mod error;
mod types;

use async_trait::async_trait;

pub use error::ChatError;
pub use types::{ChannelId, CommandEvent, Destination, MessageId, Person, UserId};

/// The chat transport as seen by the bot core.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Resolve a channel id to a deliverable destination.
    ///
    /// Returns `None` if the channel no longer exists.
    async fn resolve(&self, channel: &ChannelId) -> Result<Option<Destination>, ChatError>;

    /// Send a message to a resolved destination.
    async fn send(&self, dest: &Destination, text: &str) -> Result<(), ChatError>;

    /// Send a private message to a user (failure reports to job creators).
    async fn notify_user(&self, user: &UserId, text: &str) -> Result<(), ChatError>;

    /// Whether a user can view the given channel.
    async fn can_view(&self, channel: &ChannelId, user: &UserId) -> Result<bool, ChatError>;

    /// Add a reaction to a message (used to seed poll options).
    async fn add_reaction(
        &self,
        channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
    ) -> Result<(), ChatError>;

    /// Fetch per-emoji reaction counts for a message.
    ///
    /// Returns `None` if the message has been deleted.
    async fn reaction_counts(
        &self,
        channel: &ChannelId,
        message: &MessageId,
    ) -> Result<Option<Vec<(String, u64)>>, ChatError>;

    /// Post a message to a channel and return the new message's id.
    ///
    /// Used by poll creation, which needs the message id to tally later.
    async fn post(&self, channel: &ChannelId, text: &str) -> Result<MessageId, ChatError>;
}

/// The receive side of the transport: a stream of parsed user commands.
#[async_trait]
pub trait CommandSource: Send {
    /// The next incoming command, or `None` once the transport has closed.
    async fn next(&mut self) -> Option<CommandEvent>;
}

/// The upstream birthday list, polled on a long refresh interval.
#[async_trait]
pub trait BirthdaySource: Send + Sync {
    /// Fetch the full list. Rows without a parseable date carry `born: None`.
    async fn fetch_all(&self) -> Result<Vec<Person>, ChatError>;
}
