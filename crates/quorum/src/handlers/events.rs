//! Event announcement at fire time.

use quorum_chat::ChatGateway;
use quorum_scheduler::{Job, JobArgs};

/// Announce a due event and ping everyone signed up.
///
/// If the channel vanished between scheduling and firing, the creator gets a
/// private notice instead; there is nothing to retry against.
pub(crate) async fn announce_event(gateway: &dyn ChatGateway, job: Job) -> Result<(), String> {
    let creator = job.creator.clone();
    let JobArgs::EventAnnouncement {
        channel,
        title,
        participants,
        ..
    } = job.args
    else {
        return Err(format!("job {} is not an event announcement", job.id));
    };

    match gateway.resolve(&channel).await.map_err(|e| e.to_string())? {
        Some(dest) => {
            let mentions = participants
                .iter()
                .map(|p| p.0.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            gateway
                .send(&dest, &format!("It's time for **{title}**!\n{mentions}"))
                .await
                .map_err(|e| e.to_string())
        }
        None => gateway
            .notify_user(
                &creator,
                &format!("I could not announce **{title}**: its channel no longer exists."),
            )
            .await
            .map_err(|e| e.to_string()),
    }
}
