//! Job storage.
//!
//! The store holds scheduled jobs keyed by opaque id. It is deliberately not
//! thread-safe in the transactional sense: `mutate_args` re-reads and writes
//! back without taking any lock, because callers serialize mutation of a
//! given job through the [`LockRegistry`](crate::LockRegistry) keyed by that
//! job's id. `remove` is atomic, which is what lets the timing loop use it
//! as the claim step when firing one-shot jobs; `mark_fired` is a
//! compare-and-swap for the same reason, so independent processes sharing
//! the store dispatch each recurrence once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;

use crate::{Job, JobArgs, SchedulerError};

/// In-place mutation applied to a job's arguments under its named lock.
pub type ArgsMutation<'a> = &'a (dyn Fn(&mut JobArgs) + Send + Sync);

/// Persistent job registry, shared by all commands and the timing loop.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Store a job, assigning its insertion sequence. Never blocks on other
    /// jobs. Returns the job as stored.
    async fn insert(&self, job: Job) -> Result<Job, SchedulerError>;

    /// Point lookup. No locking; a mutate-safe read requires the caller to
    /// hold the job's lock first.
    async fn get(&self, id: &str) -> Result<Option<Job>, SchedulerError>;

    /// Re-read the job, apply `f` to its arguments, write it back.
    ///
    /// Does NOT acquire the job's lock; the caller must wrap this in a
    /// lock scope keyed by `id`. Returns `None` if the job no longer exists.
    async fn mutate_args(&self, id: &str, f: ArgsMutation<'_>)
    -> Result<Option<Job>, SchedulerError>;

    /// Delete if present. Idempotent; returns whether something was removed.
    async fn remove(&self, id: &str) -> Result<bool, SchedulerError>;

    /// Every job in the registry, in no particular order. Startup uses this
    /// to check for required recurring jobs.
    async fn list_all(&self) -> Result<Vec<Job>, SchedulerError>;

    /// Jobs due at or before `before_or_at`, ordered by fire time ascending,
    /// ties broken by insertion order.
    async fn list_pending(&self, before_or_at: DateTime<Utc>) -> Result<Vec<Job>, SchedulerError>;

    /// Claim one occurrence of a recurring job by advancing `last_run` to
    /// `at`, but only if the stored record still matches `expected`.
    ///
    /// `false` means the claim was lost (another process re-armed the job
    /// first, or the record changed); the caller must not dispatch.
    async fn mark_fired(&self, expected: &Job, at: DateTime<Utc>)
    -> Result<bool, SchedulerError>;

    /// The earliest pending deadline across all jobs, if any.
    async fn next_fire_at(&self) -> Result<Option<DateTime<Utc>>, SchedulerError>;
}

fn sort_due(jobs: &mut Vec<Job>) {
    jobs.sort_by_key(|j| (j.fire_at().unwrap_or(DateTime::<Utc>::MAX_UTC), j.seq));
}

/// In-process store for tests and single-node runs.
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
    seq: AtomicU64,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, mut job: Job) -> Result<Job, SchedulerError> {
        job.seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, SchedulerError> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn mutate_args(
        &self,
        id: &str,
        f: ArgsMutation<'_>,
    ) -> Result<Option<Job>, SchedulerError> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(id) else {
            return Ok(None);
        };
        f(&mut job.args);
        Ok(Some(job.clone()))
    }

    async fn remove(&self, id: &str) -> Result<bool, SchedulerError> {
        Ok(self.jobs.write().await.remove(id).is_some())
    }

    async fn list_all(&self) -> Result<Vec<Job>, SchedulerError> {
        Ok(self.jobs.read().await.values().cloned().collect())
    }

    async fn list_pending(&self, before_or_at: DateTime<Utc>) -> Result<Vec<Job>, SchedulerError> {
        let jobs = self.jobs.read().await;
        let mut due: Vec<Job> = jobs
            .values()
            .filter(|j| j.is_due(before_or_at))
            .cloned()
            .collect();
        sort_due(&mut due);
        Ok(due)
    }

    async fn mark_fired(
        &self,
        expected: &Job,
        at: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&expected.id) {
            Some(job) if job == expected => {
                job.last_run = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn next_fire_at(&self) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.values().filter_map(|j| j.fire_at()).min())
    }
}

/// Shared store: jobs live as JSON fields of one hash, so independent bot
/// processes see the same registry. Insertion order comes from a counter key.
pub struct RedisJobStore {
    conn: ConnectionManager,
    jobs_key: String,
    seq_key: String,
}

/// Swap a job record for its re-armed successor only if it is unchanged
/// since the caller read it. Both sides serialize with the same encoder, so
/// byte equality is record equality.
const MARK_FIRED_SCRIPT: &str = r#"
if redis.call("HGET", KEYS[1], ARGV[1]) == ARGV[2] then
    redis.call("HSET", KEYS[1], ARGV[1], ARGV[3])
    return 1
else
    return 0
end
"#;

impl RedisJobStore {
    pub fn new(conn: ConnectionManager, prefix: &str) -> Self {
        Self {
            conn,
            jobs_key: format!("{prefix}:jobs"),
            seq_key: format!("{prefix}:jobs:seq"),
        }
    }

    async fn load_all(&self) -> Result<Vec<Job>, SchedulerError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(&self.jobs_key).await?;
        let mut jobs = Vec::with_capacity(raw.len());
        for value in raw.into_values() {
            jobs.push(serde_json::from_str(&value)?);
        }
        Ok(jobs)
    }

    async fn write(&self, job: &Job) -> Result<(), SchedulerError> {
        let mut conn = self.conn.clone();
        let value = serde_json::to_string(job)?;
        let _: () = conn.hset(&self.jobs_key, &job.id, value).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn insert(&self, mut job: Job) -> Result<Job, SchedulerError> {
        let mut conn = self.conn.clone();
        let seq: u64 = conn.incr(&self.seq_key, 1).await?;
        job.seq = seq;
        self.write(&job).await?;
        Ok(job)
    }

    async fn get(&self, id: &str) -> Result<Option<Job>, SchedulerError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(&self.jobs_key, id).await?;
        match raw {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    async fn mutate_args(
        &self,
        id: &str,
        f: ArgsMutation<'_>,
    ) -> Result<Option<Job>, SchedulerError> {
        let Some(mut job) = self.get(id).await? else {
            return Ok(None);
        };
        f(&mut job.args);
        self.write(&job).await?;
        Ok(Some(job))
    }

    async fn remove(&self, id: &str) -> Result<bool, SchedulerError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.hdel(&self.jobs_key, id).await?;
        Ok(removed > 0)
    }

    async fn list_all(&self) -> Result<Vec<Job>, SchedulerError> {
        self.load_all().await
    }

    async fn list_pending(&self, before_or_at: DateTime<Utc>) -> Result<Vec<Job>, SchedulerError> {
        let mut due: Vec<Job> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|j| j.is_due(before_or_at))
            .collect();
        sort_due(&mut due);
        Ok(due)
    }

    async fn mark_fired(
        &self,
        expected: &Job,
        at: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        let mut conn = self.conn.clone();
        let mut rearmed = expected.clone();
        rearmed.last_run = Some(at);
        let swapped: i64 = redis::Script::new(MARK_FIRED_SCRIPT)
            .key(&self.jobs_key)
            .arg(&expected.id)
            .arg(serde_json::to_string(expected)?)
            .arg(serde_json::to_string(&rearmed)?)
            .invoke_async(&mut conn)
            .await?;
        Ok(swapped > 0)
    }

    async fn next_fire_at(&self) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        Ok(self.load_all().await?.iter().filter_map(|j| j.fire_at()).min())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use quorum_chat::{ChannelId, UserId};

    fn one_shot(title: &str, at: DateTime<Utc>) -> Job {
        Job::once(
            JobArgs::EventAnnouncement {
                channel: ChannelId::from("chan"),
                title: title.to_string(),
                when_display: "tomorrow".to_string(),
                participants: vec![UserId::from("@creator")],
            },
            at,
            UserId::from("@creator"),
        )
    }

    #[tokio::test]
    async fn insert_assigns_increasing_sequence() {
        let store = MemoryJobStore::new();
        let a = store.insert(one_shot("a", Utc::now())).await.unwrap();
        let b = store.insert(one_shot("b", Utc::now())).await.unwrap();
        assert!(b.seq > a.seq);
    }

    #[tokio::test]
    async fn get_returns_what_was_inserted() {
        let store = MemoryJobStore::new();
        let job = store.insert(one_shot("a", Utc::now())).await.unwrap();
        let found = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(found, job);
        assert!(store.get("no-such-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mutate_args_rewrites_in_place() {
        let store = MemoryJobStore::new();
        let job = store.insert(one_shot("a", Utc::now())).await.unwrap();

        let mutated = store
            .mutate_args(&job.id, &|args| {
                if let JobArgs::EventAnnouncement { participants, .. } = args {
                    participants.push(UserId::from("@newcomer"));
                }
            })
            .await
            .unwrap()
            .unwrap();

        let JobArgs::EventAnnouncement { participants, .. } = mutated.args else {
            panic!("wrong kind");
        };
        assert_eq!(participants.len(), 2);

        // And the write stuck.
        let reread = store.get(&job.id).await.unwrap().unwrap();
        let JobArgs::EventAnnouncement { participants, .. } = reread.args else {
            panic!("wrong kind");
        };
        assert_eq!(participants[1], UserId::from("@newcomer"));
    }

    #[tokio::test]
    async fn mutating_a_removed_job_is_not_found() {
        let store = MemoryJobStore::new();
        let job = store.insert(one_shot("a", Utc::now())).await.unwrap();
        assert!(store.remove(&job.id).await.unwrap());

        let outcome = store.mutate_args(&job.id, &|_| {}).await.unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = MemoryJobStore::new();
        let job = store.insert(one_shot("a", Utc::now())).await.unwrap();
        assert!(store.remove(&job.id).await.unwrap());
        assert!(!store.remove(&job.id).await.unwrap());
    }

    #[tokio::test]
    async fn list_pending_orders_by_fire_time_then_insertion() {
        let store = MemoryJobStore::new();
        let now = Utc::now();

        let late = store
            .insert(one_shot("late", now - Duration::seconds(10)))
            .await
            .unwrap();
        let tie_a = store
            .insert(one_shot("tie-a", now - Duration::seconds(30)))
            .await
            .unwrap();
        let tie_b = store
            .insert(one_shot("tie-b", now - Duration::seconds(30)))
            .await
            .unwrap();
        store
            .insert(one_shot("future", now + Duration::hours(1)))
            .await
            .unwrap();

        let due: Vec<String> = store
            .list_pending(now)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();

        assert_eq!(due, vec![tie_a.id, tie_b.id, late.id]);
    }

    #[tokio::test]
    async fn next_fire_at_sees_the_earliest_deadline() {
        let store = MemoryJobStore::new();
        assert!(store.next_fire_at().await.unwrap().is_none());

        let soon = Utc::now() + Duration::seconds(5);
        let later = Utc::now() + Duration::hours(2);
        store.insert(one_shot("later", later)).await.unwrap();
        store.insert(one_shot("soon", soon)).await.unwrap();

        assert_eq!(store.next_fire_at().await.unwrap(), Some(soon));
    }

    #[tokio::test]
    async fn mark_fired_rearms_recurring_jobs() {
        let store = MemoryJobStore::new();
        let scan = Job::daily(JobArgs::BirthdayScan, 0, 0, UserId::from("@ops"));
        let scan = store.insert(scan).await.unwrap();

        let first = scan.fire_at().unwrap();
        assert!(store.mark_fired(&scan, first).await.unwrap());

        let rearmed = store.get(&scan.id).await.unwrap().unwrap();
        assert_eq!(rearmed.last_run, Some(first));
        assert!(rearmed.fire_at().unwrap() > first);
    }

    #[tokio::test]
    async fn mark_fired_claims_each_occurrence_once() {
        let store = MemoryJobStore::new();
        let scan = Job::daily(JobArgs::BirthdayScan, 0, 0, UserId::from("@ops"));
        let scan = store.insert(scan).await.unwrap();

        let first = scan.fire_at().unwrap();
        assert!(store.mark_fired(&scan, first).await.unwrap());
        // A second process still holding the pre-claim record loses the swap
        // and must not dispatch.
        assert!(!store.mark_fired(&scan, first).await.unwrap());
    }

    #[tokio::test]
    async fn mark_fired_on_a_removed_job_is_a_lost_claim() {
        let store = MemoryJobStore::new();
        let scan = Job::daily(JobArgs::BirthdayScan, 0, 0, UserId::from("@ops"));
        let scan = store.insert(scan).await.unwrap();
        assert!(store.remove(&scan.id).await.unwrap());

        assert!(!store.mark_fired(&scan, Utc::now()).await.unwrap());
    }
}
