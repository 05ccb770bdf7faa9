//! Test doubles shared by the command and handler tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use quorum_chat::{ChannelId, ChatError, ChatGateway, Destination, MessageId, UserId};

/// In-memory chat service: records every delivery, with knobs for the
/// absence cases (deleted channels, hidden channels, deleted messages).
#[derive(Default)]
pub struct MockGateway {
    pub sent: Mutex<Vec<(ChannelId, String)>>,
    pub dms: Mutex<Vec<(UserId, String)>>,
    pub posts: Mutex<Vec<(ChannelId, String)>>,
    pub reactions: Mutex<Vec<(MessageId, String)>>,
    missing_channels: Mutex<HashSet<String>>,
    hidden: Mutex<HashSet<(String, String)>>,
    /// `None` simulates a deleted poll message.
    counts: Mutex<Option<Vec<(String, u64)>>>,
    next_message: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(Some(Vec::new())),
            ..Self::default()
        }
    }

    pub fn delete_channel(&self, channel: &str) {
        self.missing_channels
            .lock()
            .unwrap()
            .insert(channel.to_string());
    }

    pub fn hide_channel_from(&self, channel: &str, user: &str) {
        self.hidden
            .lock()
            .unwrap()
            .insert((channel.to_string(), user.to_string()));
    }

    pub fn set_reaction_counts(&self, counts: Option<Vec<(String, u64)>>) {
        *self.counts.lock().unwrap() = counts;
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn dm_texts(&self) -> Vec<String> {
        self.dms.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl ChatGateway for MockGateway {
    async fn resolve(&self, channel: &ChannelId) -> Result<Option<Destination>, ChatError> {
        if self.missing_channels.lock().unwrap().contains(&channel.0) {
            return Ok(None);
        }
        Ok(Some(Destination {
            channel: channel.clone(),
            name: channel.0.clone(),
        }))
    }

    async fn send(&self, dest: &Destination, text: &str) -> Result<(), ChatError> {
        self.sent
            .lock()
            .unwrap()
            .push((dest.channel.clone(), text.to_string()));
        Ok(())
    }

    async fn notify_user(&self, user: &UserId, text: &str) -> Result<(), ChatError> {
        self.dms
            .lock()
            .unwrap()
            .push((user.clone(), text.to_string()));
        Ok(())
    }

    async fn can_view(&self, channel: &ChannelId, user: &UserId) -> Result<bool, ChatError> {
        Ok(!self
            .hidden
            .lock()
            .unwrap()
            .contains(&(channel.0.clone(), user.0.clone())))
    }

    async fn add_reaction(
        &self,
        _channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
    ) -> Result<(), ChatError> {
        self.reactions
            .lock()
            .unwrap()
            .push((message.clone(), emoji.to_string()));
        Ok(())
    }

    async fn reaction_counts(
        &self,
        _channel: &ChannelId,
        _message: &MessageId,
    ) -> Result<Option<Vec<(String, u64)>>, ChatError> {
        Ok(self.counts.lock().unwrap().clone())
    }

    async fn post(&self, channel: &ChannelId, text: &str) -> Result<MessageId, ChatError> {
        self.posts
            .lock()
            .unwrap()
            .push((channel.clone(), text.to_string()));
        let id = self.next_message.fetch_add(1, Ordering::Relaxed);
        Ok(MessageId(format!("msg-{id}")))
    }
}
