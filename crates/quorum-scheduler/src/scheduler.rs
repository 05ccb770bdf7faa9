//! The timing loop.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Notify, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{Job, JobKind, JobStore, SchedulerError};

/// Floor on the computed sleep, so a deadline in the past still yields.
const MIN_SLEEP: Duration = Duration::from_millis(10);

/// Ceiling on the computed sleep; the loop re-reads the store at least this
/// often even if no wake arrives.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Sleep before retrying when the store is unreachable.
const STORE_RETRY_SLEEP: Duration = Duration::from_secs(5);

/// A fire-time handler: reads the job's arguments, performs the external
/// side effect, and reports failure as a message rather than panicking.
pub type JobHandler =
    Arc<dyn Fn(Job) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync>;

/// Handler dispatch, keyed by job kind.
#[derive(Default)]
pub struct HandlerTable {
    handlers: HashMap<JobKind, JobHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: JobKind, handler: JobHandler) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn get(&self, kind: JobKind) -> Option<&JobHandler> {
        self.handlers.get(&kind)
    }
}

/// Drives firing: one long-lived timing loop per process.
///
/// Inserts and removals go through the scheduler (not the store directly)
/// so the loop can be woken when the earliest deadline changes. Point
/// lookups and lock-guarded argument mutation go straight to [`store`].
///
/// [`store`]: Scheduler::store
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    wake: Notify,
}

impl Scheduler {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            wake: Notify::new(),
        }
    }

    /// The backing store, for lookups and locked mutation.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Insert a job and wake the loop in case its deadline is now earliest.
    pub async fn schedule(&self, job: Job) -> Result<Job, SchedulerError> {
        let stored = self.store.insert(job).await?;
        debug!(id = %stored.id, kind = ?stored.kind(), fire_at = ?stored.fire_at(), "job scheduled");
        self.wake.notify_one();
        Ok(stored)
    }

    /// Remove a job so a cancelled deadline does not still fire.
    pub async fn remove(&self, id: &str) -> Result<bool, SchedulerError> {
        let removed = self.store.remove(id).await?;
        if removed {
            debug!(id, "job removed");
            self.wake.notify_one();
        }
        Ok(removed)
    }

    /// Run the timing loop until shutdown.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>, handlers: HandlerTable) {
        info!("scheduler starting");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let sleep_for = match self.fire_due(&handlers).await {
                Ok(()) => self.sleep_duration().await,
                Err(e) => {
                    // Store outage degrades firing; retry on the next wake
                    // instead of crashing the loop.
                    warn!(error = %e, "store unavailable, retrying");
                    STORE_RETRY_SLEEP
                }
            };

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("scheduler received shutdown signal");
                    }
                }
                _ = self.wake.notified() => {}
                _ = sleep(sleep_for) => {}
            }
        }

        info!("scheduler shut down");
    }

    /// Claim and dispatch every due job.
    ///
    /// One-shot jobs are claimed by removal before dispatch: if a concurrent
    /// cancel already removed the job, the handler is not invoked, so exactly
    /// one of {cancel effect, fire effect} is ever observed. Recurring jobs
    /// are claimed by the compare-and-swap re-arm in `mark_fired`: of all
    /// loops sharing the store, only the one whose swap lands dispatches the
    /// occurrence. Handlers run on their own tasks; a slow or failing handler
    /// cannot block the next deadline.
    async fn fire_due(&self, handlers: &HandlerTable) -> Result<(), SchedulerError> {
        let now = Utc::now();
        let due = self.store.list_pending(now).await?;

        for job in due {
            if job.is_recurring() {
                if !self.store.mark_fired(&job, now).await? {
                    // Another loop re-armed this occurrence first.
                    debug!(id = %job.id, "recurring job already claimed, skipping");
                    continue;
                }
            } else if !self.store.remove(&job.id).await? {
                // A concurrent cancel won the claim.
                debug!(id = %job.id, "due job already removed, skipping");
                continue;
            }

            let Some(handler) = handlers.get(job.kind()) else {
                error!(id = %job.id, kind = ?job.kind(), "no handler registered for job kind");
                continue;
            };

            let handler = Arc::clone(handler);
            let id = job.id.clone();
            let kind = job.kind();
            info!(id = %id, ?kind, "firing job");
            tokio::spawn(async move {
                if let Err(error) = handler(job).await {
                    error!(id = %id, ?kind, %error, "job handler failed");
                }
            });
        }

        Ok(())
    }

    /// Delay until the earliest pending deadline, clamped to sane bounds.
    async fn sleep_duration(&self) -> Duration {
        match self.store.next_fire_at().await {
            Ok(Some(next)) => {
                let millis = (next - Utc::now()).num_milliseconds().max(0) as u64;
                Duration::from_millis(millis).clamp(MIN_SLEEP, MAX_SLEEP)
            }
            Ok(None) => MAX_SLEEP,
            Err(e) => {
                warn!(error = %e, "could not read next deadline");
                STORE_RETRY_SLEEP
            }
        }
    }
}
