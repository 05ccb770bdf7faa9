//! Fire-time job handlers.
//!
//! Handlers run on their own tasks off the timing loop and report failure as
//! strings; by the time one runs, its job has already been claimed (removed
//! or re-armed), so a handler never touches the registry.

use std::sync::Arc;

use quorum_chat::{ChannelId, ChatGateway};
use quorum_scheduler::{HandlerTable, JobHandler, JobKind};

use crate::birthdays::BirthdayBook;

mod birthdays;
mod events;
mod polls;

pub(crate) use polls::EMOJI_ORDER;

/// Wire every job kind to its handler.
pub fn handler_table(
    gateway: Arc<dyn ChatGateway>,
    book: Arc<BirthdayBook>,
    announcement_channel: ChannelId,
) -> HandlerTable {
    let announce: JobHandler = {
        let gateway = Arc::clone(&gateway);
        Arc::new(move |job| {
            let gateway = Arc::clone(&gateway);
            Box::pin(async move { events::announce_event(gateway.as_ref(), job).await })
        })
    };

    let resolve: JobHandler = {
        let gateway = Arc::clone(&gateway);
        Arc::new(move |job| {
            let gateway = Arc::clone(&gateway);
            Box::pin(async move { polls::resolve_poll(gateway.as_ref(), job).await })
        })
    };

    let scan: JobHandler = Arc::new(move |_job| {
        let gateway = Arc::clone(&gateway);
        let book = Arc::clone(&book);
        let channel = announcement_channel.clone();
        Box::pin(async move {
            birthdays::check_birthdays(gateway.as_ref(), book.as_ref(), &channel).await
        })
    });

    HandlerTable::new()
        .register(JobKind::EventAnnouncement, announce)
        .register(JobKind::PollResolution, resolve)
        .register(JobKind::BirthdayScan, scan)
}
