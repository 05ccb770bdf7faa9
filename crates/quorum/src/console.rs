//! Console transport, for running the daemon without a chat service.
//!
//! Deliveries print to stdout; commands arrive on stdin, one per line,
//! pipe-separated:
//!
//! ```text
//! schedule|<channel>|<user>|<title>|<when>
//! signup|<user>|<job id>
//! cancel|<user>|<job id>
//! poll|<channel>|<user>|<topic>|<duration>|<option>[|<option>...]
//! ```
//!
//! A production deployment swaps in a real [`ChatGateway`] and
//! [`CommandSource`] instead; everything else is transport-agnostic.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;

use quorum_chat::{
    BirthdaySource, ChannelId, ChatError, ChatGateway, CommandEvent, CommandSource, Destination,
    MessageId, Person, UserId,
};

/// Gateway that treats stdout as the one channel everyone can see.
pub struct ConsoleGateway {
    next_message: AtomicU64,
}

impl ConsoleGateway {
    pub fn new() -> Self {
        Self {
            next_message: AtomicU64::new(1),
        }
    }
}

impl Default for ConsoleGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatGateway for ConsoleGateway {
    async fn resolve(&self, channel: &ChannelId) -> Result<Option<Destination>, ChatError> {
        Ok(Some(Destination {
            channel: channel.clone(),
            name: channel.0.clone(),
        }))
    }

    async fn send(&self, dest: &Destination, text: &str) -> Result<(), ChatError> {
        println!("[#{}] {text}", dest.name);
        Ok(())
    }

    async fn notify_user(&self, user: &UserId, text: &str) -> Result<(), ChatError> {
        println!("[dm {user}] {text}");
        Ok(())
    }

    async fn can_view(&self, _channel: &ChannelId, _user: &UserId) -> Result<bool, ChatError> {
        Ok(true)
    }

    async fn add_reaction(
        &self,
        _channel: &ChannelId,
        message: &MessageId,
        emoji: &str,
    ) -> Result<(), ChatError> {
        println!("[react {message}] {emoji}");
        Ok(())
    }

    async fn reaction_counts(
        &self,
        _channel: &ChannelId,
        _message: &MessageId,
    ) -> Result<Option<Vec<(String, u64)>>, ChatError> {
        // The console cannot collect reactions; polls resolve with zero votes.
        Ok(Some(Vec::new()))
    }

    async fn post(&self, channel: &ChannelId, text: &str) -> Result<MessageId, ChatError> {
        let id = self.next_message.fetch_add(1, Ordering::Relaxed);
        println!("[#{channel} msg {id}] {text}");
        Ok(MessageId(id.to_string()))
    }
}

/// Commands read line-by-line from stdin.
pub struct ConsoleCommands {
    lines: Lines<BufReader<Stdin>>,
}

impl ConsoleCommands {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for ConsoleCommands {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandSource for ConsoleCommands {
    async fn next(&mut self) -> Option<CommandEvent> {
        loop {
            let line = self.lines.next_line().await.ok()??;
            if line.trim().is_empty() {
                continue;
            }
            match parse_console_line(&line) {
                Some(event) => return Some(event),
                None => warn!(%line, "unrecognized console command"),
            }
        }
    }
}

fn parse_console_line(line: &str) -> Option<CommandEvent> {
    let fields: Vec<&str> = line.trim().split('|').collect();
    match fields.as_slice() {
        ["schedule", channel, user, title, when] => Some(CommandEvent::ScheduleEvent {
            channel: ChannelId::from(*channel),
            requester: UserId::from(*user),
            title: title.to_string(),
            when: when.to_string(),
        }),
        ["signup", user, job_id] => Some(CommandEvent::SignUp {
            requester: UserId::from(*user),
            job_id: job_id.to_string(),
        }),
        ["cancel", user, job_id] => Some(CommandEvent::Cancel {
            requester: UserId::from(*user),
            job_id: job_id.to_string(),
        }),
        ["poll", channel, user, topic, duration, options @ ..] if !options.is_empty() => {
            Some(CommandEvent::CreatePoll {
                channel: ChannelId::from(*channel),
                requester: UserId::from(*user),
                topic: topic.to_string(),
                duration: duration.to_string(),
                options: options.iter().map(|o| o.to_string()).collect(),
            })
        }
        _ => None,
    }
}

/// Birthday source for console runs: nobody has a birthday.
pub struct NoBirthdays;

#[async_trait]
impl BirthdaySource for NoBirthdays {
    async fn fetch_all(&self) -> Result<Vec<Person>, ChatError> {
        Ok(Vec::new())
    }
}
