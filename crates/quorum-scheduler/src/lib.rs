//! Lockable deferred-job registry for Quorum.
//!
//! This crate is the bot's one piece of real machinery:
//! - A [`JobStore`] holding scheduled jobs keyed by opaque id, with in-place
//!   argument mutation (sign-ups append to an event's participant list)
//! - A [`LockRegistry`] of named mutual-exclusion locks backed by the shared
//!   store, serializing concurrent mutators of the same job across processes
//! - A [`Scheduler`] timing loop that sleeps until the nearest deadline,
//!   wakes early when an insert or remove changes that deadline, claims due
//!   jobs, and dispatches their handlers on independent tasks
//!
//! One-shot jobs are claimed by removal before dispatch, so a racing cancel
//! and a firing observe exactly one of the two effects. Recurring jobs are
//! claimed by a compare-and-swap re-arm, so processes sharing the store
//! dispatch each occurrence once.

mod error;
mod lock;
mod scheduler;
mod store;
mod types;

pub use error::SchedulerError;
pub use lock::{LockBackend, LockGuard, LockRegistry, MemoryLockBackend, RedisLockBackend};
pub use scheduler::{HandlerTable, JobHandler, Scheduler};
pub use store::{ArgsMutation, JobStore, MemoryJobStore, RedisJobStore};
pub use types::{Job, JobArgs, JobKind, JobSchedule, generate_job_id};
