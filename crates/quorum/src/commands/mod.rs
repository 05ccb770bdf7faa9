//! User commands.
//!
//! Every command runs on its own task, so all of them race: against each
//! other and against the timing loop firing the very job they touch. The
//! rules here are uniform:
//! - reads that precede a write happen inside the job's named lock scope
//! - cancellation is the store's atomic remove, the same claim the timing
//!   loop uses, so exactly one of {cancel, fire} wins
//! - errors are reported to the requester and never tear anything down

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use quorum_chat::{ChatError, ChatGateway, CommandEvent, UserId};
use quorum_scheduler::{LockRegistry, Scheduler, SchedulerError};

mod events;
mod polls;

pub use events::SignupOutcome;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl CommandError {
    /// The reply shown to the user who issued the failing command.
    fn user_message(&self) -> String {
        match self {
            CommandError::Scheduler(SchedulerError::NotFound(id)) => {
                format!("Could not find a job with id {id}. Make sure you provided the correct id.")
            }
            CommandError::Scheduler(SchedulerError::NotAuthorized(id)) => {
                format!("Only the creator of job {id} can cancel it.")
            }
            CommandError::Scheduler(SchedulerError::LockTimeout(_)) => {
                "That job is busy with another update; try again in a moment.".to_string()
            }
            CommandError::Scheduler(SchedulerError::Validation(reason)) => reason.clone(),
            CommandError::Scheduler(
                SchedulerError::LockUnavailable(_) | SchedulerError::Store(_),
            ) => "Something went wrong on my end; try again later.".to_string(),
            CommandError::Chat(_) => {
                "The chat service did not cooperate; try again later.".to_string()
            }
        }
    }
}

/// Shared state behind every command task.
pub struct Coordinator {
    scheduler: Arc<Scheduler>,
    locks: LockRegistry,
    gateway: Arc<dyn ChatGateway>,
}

impl Coordinator {
    pub fn new(
        scheduler: Arc<Scheduler>,
        locks: LockRegistry,
        gateway: Arc<dyn ChatGateway>,
    ) -> Self {
        Self {
            scheduler,
            locks,
            gateway,
        }
    }

    /// Run one command to completion, reporting any failure to the requester.
    pub async fn dispatch(&self, event: CommandEvent) {
        let requester = event.requester().clone();
        let outcome = match event {
            CommandEvent::ScheduleEvent {
                channel,
                requester,
                title,
                when,
            } => self
                .schedule_event(&channel, &requester, &title, &when)
                .await
                .map(|_| ()),
            CommandEvent::SignUp { requester, job_id } => {
                self.signup(&job_id, &requester).await.map(|_| ())
            }
            CommandEvent::Cancel { requester, job_id } => {
                self.cancel(&job_id, &requester).await.map(|_| ())
            }
            CommandEvent::CreatePoll {
                channel,
                requester,
                topic,
                duration,
                options,
            } => self
                .create_poll(&channel, &requester, &topic, &duration, &options)
                .await
                .map(|_| ()),
        };

        if let Err(error) = outcome {
            self.report_failure(&requester, &error).await;
        }
    }

    async fn report_failure(&self, requester: &UserId, error: &CommandError) {
        warn!(%requester, %error, "command failed");
        if let Err(notify_error) = self
            .gateway
            .notify_user(requester, &error.user_message())
            .await
        {
            warn!(%requester, error = %notify_error, "could not deliver failure notice");
        }
    }
}
