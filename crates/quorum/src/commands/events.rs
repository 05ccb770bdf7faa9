//! Event scheduling, sign-up, and cancellation.

use chrono::{DateTime, Utc};
use tracing::warn;

use quorum_chat::{ChannelId, UserId};
use quorum_scheduler::{Job, JobArgs, JobStore, SchedulerError};

use super::{CommandError, Coordinator};

/// What happened to a sign-up request that did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupOutcome {
    Added,
    AlreadySignedUp,
}

/// The event fields a command needs after its lock scope has closed, so
/// notifications go out without holding the lock.
struct EventSnapshot {
    channel: ChannelId,
    title: String,
    when_display: String,
    host: UserId,
    participants: Vec<UserId>,
}

fn snapshot(job: &Job) -> Option<EventSnapshot> {
    let JobArgs::EventAnnouncement {
        channel,
        title,
        when_display,
        participants,
    } = &job.args
    else {
        return None;
    };
    Some(EventSnapshot {
        channel: channel.clone(),
        title: title.clone(),
        when_display: when_display.clone(),
        host: participants.first()?.clone(),
        participants: participants.clone(),
    })
}

impl Coordinator {
    /// Schedule an event announcement and advertise its sign-up handle.
    pub async fn schedule_event(
        &self,
        channel: &ChannelId,
        requester: &UserId,
        title: &str,
        when: &str,
    ) -> Result<Job, CommandError> {
        let at = parse_event_time(when).ok_or_else(|| {
            SchedulerError::Validation(format!(
                "I could not make sense of \"{when}\". Try e.g. \"3/27/26 19:00 EDT\"."
            ))
        })?;
        let now = Utc::now();
        if at <= now {
            return Err(SchedulerError::Validation(format!("\"{when}\" is in the past.")).into());
        }

        let job = self
            .scheduler
            .schedule(Job::once(
                JobArgs::EventAnnouncement {
                    channel: channel.clone(),
                    title: title.to_string(),
                    when_display: when.to_string(),
                    participants: vec![requester.clone()],
                },
                at,
                requester.clone(),
            ))
            .await?;

        if let Some(dest) = self.gateway.resolve(channel).await? {
            let wait = at - now;
            self.gateway
                .send(
                    &dest,
                    &format!(
                        "**{title}** hosted by {requester}\n\
                         Starts {when} ({}; about {}h {}m from now)\n\
                         Sign up or cancel with the id **{}**",
                        at.format("%Y-%m-%d %H:%M UTC"),
                        wait.num_hours(),
                        wait.num_minutes() % 60,
                        job.id,
                    ),
                )
                .await?;
        }

        Ok(job)
    }

    /// Add the requester to an event's participant list.
    ///
    /// The read-verify-write spans the job's lock, so two simultaneous
    /// sign-ups cannot overwrite each other. Signing up twice is not an
    /// error; the second attempt gets a private reminder instead.
    pub async fn signup(
        &self,
        job_id: &str,
        requester: &UserId,
    ) -> Result<SignupOutcome, CommandError> {
        let lock = self.locks.acquire(job_id).await?;
        let result = self.signup_locked(job_id, requester).await;
        if let Err(error) = lock.release().await {
            warn!(job_id, %error, "failed to release sign-up lock");
        }
        let (outcome, event) = result?;

        match outcome {
            SignupOutcome::Added => {
                if let Some(dest) = self.gateway.resolve(&event.channel).await? {
                    self.gateway
                        .send(
                            &dest,
                            &format!(
                                "{requester} signed up for **{}** ({}) hosted by {}",
                                event.title, event.when_display, event.host,
                            ),
                        )
                        .await?;
                }
            }
            SignupOutcome::AlreadySignedUp => {
                self.gateway
                    .notify_user(
                        requester,
                        &format!(
                            "You have already signed up for **{}** ({}) hosted by {}.",
                            event.title, event.when_display, event.host,
                        ),
                    )
                    .await?;
            }
        }

        Ok(outcome)
    }

    async fn signup_locked(
        &self,
        job_id: &str,
        requester: &UserId,
    ) -> Result<(SignupOutcome, EventSnapshot), CommandError> {
        let not_found = || SchedulerError::NotFound(job_id.to_string());

        let job = self.scheduler.store().get(job_id).await?.ok_or_else(not_found)?;
        let event = snapshot(&job).ok_or_else(not_found)?;

        // A job in a channel the requester cannot see is, to them, no job.
        if !self.gateway.can_view(&event.channel, requester).await? {
            return Err(not_found().into());
        }

        if event.participants.contains(requester) {
            return Ok((SignupOutcome::AlreadySignedUp, event));
        }

        let joiner = requester.clone();
        let mutated = self
            .scheduler
            .store()
            .mutate_args(job_id, &move |args| {
                if let JobArgs::EventAnnouncement { participants, .. } = args
                    && !participants.contains(&joiner)
                {
                    participants.push(joiner.clone());
                }
            })
            .await?
            .ok_or_else(not_found)?;

        let event = snapshot(&mutated).ok_or_else(not_found)?;
        Ok((SignupOutcome::Added, event))
    }

    /// Cancel an event. Only its creator may do this.
    pub async fn cancel(&self, job_id: &str, requester: &UserId) -> Result<(), CommandError> {
        let lock = self.locks.acquire(job_id).await?;
        let result = self.cancel_locked(job_id, requester).await;
        if let Err(error) = lock.release().await {
            warn!(job_id, %error, "failed to release cancel lock");
        }
        let event = result?;

        let mentions = event
            .participants
            .iter()
            .map(|p| p.0.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        match self.gateway.resolve(&event.channel).await? {
            Some(dest) => {
                self.gateway
                    .send(
                        &dest,
                        &format!(
                            "{requester} cancelled **{}** ({}).\nSorry {mentions}!",
                            event.title, event.when_display,
                        ),
                    )
                    .await?;
            }
            None => {
                self.gateway
                    .notify_user(
                        requester,
                        &format!(
                            "The channel for **{}** no longer exists, but the event is cancelled.",
                            event.title,
                        ),
                    )
                    .await?;
            }
        }

        Ok(())
    }

    async fn cancel_locked(
        &self,
        job_id: &str,
        requester: &UserId,
    ) -> Result<EventSnapshot, CommandError> {
        let not_found = || SchedulerError::NotFound(job_id.to_string());

        let job = self.scheduler.store().get(job_id).await?.ok_or_else(not_found)?;
        let event = snapshot(&job).ok_or_else(not_found)?;
        if job.creator != *requester {
            return Err(SchedulerError::NotAuthorized(job_id.to_string()).into());
        }

        // Atomic claim, shared with the timing loop: if firing got here
        // first, the cancel reports the job as already gone.
        if !self.scheduler.remove(job_id).await? {
            return Err(not_found().into());
        }

        Ok(event)
    }
}

/// Parse a user-supplied event time.
///
/// Accepts RFC 3339, or `M/D/YY H:MM[:SS] [am/pm] TZ` where TZ is a North
/// American abbreviation, `GMT`, or `UTC` with an optional hour offset. The
/// result is pinned to UTC here, once, so later daylight-saving transitions
/// cannot move an already-scheduled event.
pub(crate) fn parse_event_time(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input.trim()) {
        return Some(dt.with_timezone(&Utc));
    }

    let (head, tz) = input.trim().rsplit_once(' ')?;
    let offset = normalize_offset(tz)?;
    let candidate = format!("{head} {offset}");

    const FORMATS: &[&str] = &[
        "%m/%d/%y %H:%M:%S %z",
        "%m/%d/%y %H:%M %z",
        "%m/%d/%y %I:%M:%S %p %z",
        "%m/%d/%y %I:%M %p %z",
    ];
    for format in FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&candidate, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    None
}

/// Timezone abbreviations accepted in event times, as RFC 822 offsets.
const TZ_OFFSETS: &[(&str, &str)] = &[
    ("EDT", "-0400"),
    ("EST", "-0500"),
    ("CDT", "-0500"),
    ("CST", "-0600"),
    ("MDT", "-0600"),
    ("MST", "-0700"),
    ("PDT", "-0700"),
    ("PST", "-0800"),
    ("AKDT", "-0800"),
    ("AKST", "-0900"),
    ("GMT", "+0000"),
    ("UT", "+0000"),
];

fn normalize_offset(tz: &str) -> Option<String> {
    let upper = tz.to_ascii_uppercase();
    if let Some(rest) = upper.strip_prefix("UTC") {
        if rest.is_empty() {
            return Some("+0000".to_string());
        }
        let (sign, hours) = if let Some(h) = rest.strip_prefix('+') {
            ('+', h)
        } else if let Some(h) = rest.strip_prefix('-') {
            ('-', h)
        } else {
            return None;
        };
        if let Ok(h) = hours.parse::<u32>()
            && h <= 14
        {
            return Some(format!("{sign}{h:02}00"));
        }
        return None;
    }
    TZ_OFFSETS
        .iter()
        .find(|(name, _)| *name == upper)
        .map(|(_, offset)| (*offset).to_string())
}
