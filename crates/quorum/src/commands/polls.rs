//! Poll creation.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;

use quorum_chat::{ChannelId, UserId};
use quorum_scheduler::{Job, JobArgs, SchedulerError};

use crate::handlers::EMOJI_ORDER;

use super::{CommandError, Coordinator};

/// Shortest poll we will run; anything less resolves before anyone votes.
const MIN_POLL: Duration = Duration::from_secs(30);

impl Coordinator {
    /// Post a poll message, seed one reaction per option, and schedule its
    /// resolution.
    ///
    /// All validation happens before the poll message is posted or the job
    /// created, so a rejected poll leaves no trace anywhere.
    pub async fn create_poll(
        &self,
        channel: &ChannelId,
        requester: &UserId,
        topic: &str,
        duration: &str,
        options: &[String],
    ) -> Result<Job, CommandError> {
        if options.is_empty() {
            return Err(
                SchedulerError::Validation("Please provide at least one option.".to_string())
                    .into(),
            );
        }
        if options.len() > EMOJI_ORDER.len() {
            return Err(SchedulerError::Validation(format!(
                "I can only handle up to {} options.",
                EMOJI_ORDER.len()
            ))
            .into());
        }
        let wait = parse_poll_duration(duration)?;

        let mut text = format!(
            "Poll by {requester}, resolving in {}: **{topic}**\n\n",
            render_duration(wait)
        );
        for (index, option) in options.iter().enumerate() {
            text.push_str(&format!("{}. {option}\n", index + 1));
        }

        let message = self.gateway.post(channel, &text).await?;
        for index in 0..options.len() {
            self.gateway
                .add_reaction(channel, &message, EMOJI_ORDER[index])
                .await?;
        }

        let at = Utc::now()
            + chrono::Duration::from_std(wait).map_err(|_| {
                SchedulerError::Validation(format!("\"{duration}\" is too long for a poll."))
            })?;
        let job = self
            .scheduler
            .schedule(Job::once(
                JobArgs::PollResolution {
                    channel: channel.clone(),
                    message,
                    topic: topic.to_string(),
                    options: options.to_vec(),
                },
                at,
                requester.clone(),
            ))
            .await?;

        Ok(job)
    }
}

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<days>\d+)d)?(?:(?P<hours>\d+)h)?(?:(?P<minutes>\d+)m)?(?:(?P<seconds>\d+)s)?$")
        .expect("duration pattern compiles")
});

/// Parse a poll duration: `XdXhXmXs` with any subset of units present, or a
/// bare integer meaning minutes. Rejects anything under [`MIN_POLL`].
pub(crate) fn parse_poll_duration(input: &str) -> Result<Duration, SchedulerError> {
    let input = input.trim();
    let invalid =
        || SchedulerError::Validation(format!("\"{input}\" is not a time I understand."));

    let total_secs = if let Ok(minutes) = input.parse::<u64>() {
        minutes.checked_mul(60).ok_or_else(invalid)?
    } else {
        let caps = DURATION_RE.captures(input).ok_or_else(invalid)?;
        let unit = |name: &str| -> Result<u64, SchedulerError> {
            caps.name(name)
                .map(|m| m.as_str().parse::<u64>().map_err(|_| invalid()))
                .unwrap_or(Ok(0))
        };
        if ["days", "hours", "minutes", "seconds"]
            .iter()
            .all(|name| caps.name(name).is_none())
        {
            return Err(invalid());
        }
        let mut total: u64 = 0;
        for (name, scale) in [("days", 86_400), ("hours", 3_600), ("minutes", 60), ("seconds", 1)] {
            total = unit(name)?
                .checked_mul(scale)
                .and_then(|secs| total.checked_add(secs))
                .ok_or_else(invalid)?;
        }
        total
    };

    if total_secs < MIN_POLL.as_secs() {
        return Err(SchedulerError::Validation(format!(
            "A poll must run for at least {} seconds.",
            MIN_POLL.as_secs()
        )));
    }
    Ok(Duration::from_secs(total_secs))
}

/// Render a duration the way it reads in a poll announcement.
pub(crate) fn render_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        let tail = if hours + minutes + seconds > 0 {
            format!(" and {hours}:{minutes:02}:{seconds:02}")
        } else {
            String::new()
        };
        format!("{days} day{}{tail}", if days == 1 { "" } else { "s" })
    } else if hours > 0 || seconds > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes} minute{}", if minutes == 1 { "" } else { "s" })
    }
}
