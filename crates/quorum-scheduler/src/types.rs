//! Job registry types.

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quorum_chat::{ChannelId, MessageId, UserId};

/// Generate a fresh opaque job id.
///
/// Ids are stable for the job's lifetime, never reused in-process, and safe
/// to show to end users as the sign-up/cancel handle.
pub fn generate_job_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A scheduled unit of deferred work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Opaque id, assigned at creation; also the lock key.
    pub id: String,
    /// Kind-specific arguments. Mutable only under the job's named lock.
    pub args: JobArgs,
    /// When (or how often) to fire.
    pub schedule: JobSchedule,
    /// The identity that created the job; sole actor permitted to cancel it.
    pub creator: UserId,
    /// When this job was created.
    pub created_at: DateTime<Utc>,
    /// Store-assigned insertion sequence; tie-break for equal fire times.
    pub seq: u64,
    /// Last completed firing. Recurring jobs re-arm from this.
    pub last_run: Option<DateTime<Utc>>,
}

/// Selects the handler invoked at fire time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    EventAnnouncement,
    PollResolution,
    BirthdayScan,
}

/// Kind-specific job arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobArgs {
    /// Announce an event and ping everyone signed up.
    EventAnnouncement {
        channel: ChannelId,
        title: String,
        /// The creator's original time string, echoed in messages.
        when_display: String,
        /// Participant mentions. Element 0 is always the creator and is
        /// never removed; no duplicates.
        participants: Vec<UserId>,
    },
    /// Tally reactions on the poll message and announce the results.
    PollResolution {
        channel: ChannelId,
        message: MessageId,
        topic: String,
        /// Registered options, in the order they were offered.
        options: Vec<String>,
    },
    /// Recurring daily check of the cached birthday list.
    BirthdayScan,
}

impl JobArgs {
    pub fn kind(&self) -> JobKind {
        match self {
            JobArgs::EventAnnouncement { .. } => JobKind::EventAnnouncement,
            JobArgs::PollResolution { .. } => JobKind::PollResolution,
            JobArgs::BirthdayScan => JobKind::BirthdayScan,
        }
    }
}

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobSchedule {
    /// Fire once at an absolute instant, then be removed.
    ///
    /// User-supplied local/zoned times are converted to UTC once, at
    /// schedule time, so daylight-saving transitions cannot drift them.
    Once { at: DateTime<Utc> },
    /// Fire every day at the given local wall-clock time.
    Daily { hour: u32, minute: u32 },
}

impl JobSchedule {
    /// The next fire time, given the last completed firing.
    ///
    /// `None` means the schedule is exhausted (a one-shot that already ran).
    pub fn next_fire(
        &self,
        last_run: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            JobSchedule::Once { at } => {
                if last_run.is_some() {
                    None
                } else {
                    Some(*at)
                }
            }
            JobSchedule::Daily { hour, minute } => {
                next_daily_fire(last_run.unwrap_or(created_at), *hour, *minute)
            }
        }
    }
}

/// Next local occurrence of `hour:minute` strictly after `anchor`.
///
/// Occurrences are recomputed from the calendar each time rather than by
/// adding a fixed 24h, so the recurrence tracks local midnight across
/// daylight-saving transitions. A wall-clock time that does not exist on a
/// given day (spring-forward gap) rolls to the next day.
fn next_daily_fire(anchor: DateTime<Utc>, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let local_anchor = anchor.with_timezone(&Local);

    let mut day = local_anchor.date_naive();
    if local_anchor.time() >= time {
        day = day.succ_opt()?;
    }

    for _ in 0..3 {
        if let Some(dt) = Local.from_local_datetime(&day.and_time(time)).earliest() {
            return Some(dt.with_timezone(&Utc));
        }
        day = day.succ_opt()?;
    }

    None
}

impl Job {
    /// Create a new one-shot job.
    pub fn once(args: JobArgs, at: DateTime<Utc>, creator: UserId) -> Self {
        Self {
            id: generate_job_id(),
            args,
            schedule: JobSchedule::Once { at },
            creator,
            created_at: Utc::now(),
            seq: 0,
            last_run: None,
        }
    }

    /// Create a new recurring daily job.
    pub fn daily(args: JobArgs, hour: u32, minute: u32, creator: UserId) -> Self {
        Self {
            id: generate_job_id(),
            args,
            schedule: JobSchedule::Daily { hour, minute },
            creator,
            created_at: Utc::now(),
            seq: 0,
            last_run: None,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.args.kind()
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self.schedule, JobSchedule::Daily { .. })
    }

    /// The next instant this job should fire, if any.
    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        self.schedule.next_fire(self.last_run, self.created_at)
    }

    /// Whether this job is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.fire_at().is_some_and(|at| at <= now)
    }
}
