//! Poll resolution at fire time.

use quorum_chat::ChatGateway;
use quorum_scheduler::{Job, JobArgs};

/// Reaction emoji assigned to options, in offering order: the ten digit
/// emoji, then regional indicators A through J.
pub(crate) const EMOJI_ORDER: [&str; 20] = [
    "1\u{fe0f}\u{20e3}",
    "2\u{fe0f}\u{20e3}",
    "3\u{fe0f}\u{20e3}",
    "4\u{fe0f}\u{20e3}",
    "5\u{fe0f}\u{20e3}",
    "6\u{fe0f}\u{20e3}",
    "7\u{fe0f}\u{20e3}",
    "8\u{fe0f}\u{20e3}",
    "9\u{fe0f}\u{20e3}",
    "\u{1f51f}",
    "\u{1f1e6}",
    "\u{1f1e7}",
    "\u{1f1e8}",
    "\u{1f1e9}",
    "\u{1f1ea}",
    "\u{1f1eb}",
    "\u{1f1ec}",
    "\u{1f1ed}",
    "\u{1f1ee}",
    "\u{1f1ef}",
];

/// Tally reactions on a due poll and announce the outcome.
///
/// Deleted channel or message means the votes are unrecoverable; the creator
/// gets a private notice and the job still counts as handled.
pub(crate) async fn resolve_poll(gateway: &dyn ChatGateway, job: Job) -> Result<(), String> {
    let creator = job.creator.clone();
    let JobArgs::PollResolution {
        channel,
        message,
        topic,
        options,
    } = job.args
    else {
        return Err(format!("job {} is not a poll resolution", job.id));
    };

    let Some(dest) = gateway.resolve(&channel).await.map_err(|e| e.to_string())? else {
        return gateway
            .notify_user(
                &creator,
                &format!("I could not resolve your poll on **{topic}**: its channel no longer exists."),
            )
            .await
            .map_err(|e| e.to_string());
    };

    let Some(reactions) = gateway
        .reaction_counts(&channel, &message)
        .await
        .map_err(|e| e.to_string())?
    else {
        return gateway
            .notify_user(
                &creator,
                &format!("I could not resolve your poll on **{topic}**: the poll message was deleted."),
            )
            .await
            .map_err(|e| e.to_string());
    };

    gateway
        .send(&dest, &render_results(&topic, &options, &reactions))
        .await
        .map_err(|e| e.to_string())
}

fn vote_word(count: u64) -> &'static str {
    if count == 1 { "vote" } else { "votes" }
}

/// Render a poll's outcome.
///
/// Registered options are ranked descending, ties broken by option text;
/// their counts exclude the seed reaction the bot added at creation.
/// Reactions outside the registered set are "off-list": reported in their
/// own section, never folded into the ranking, and flagged up front when the
/// best of them outpolls every registered option.
pub(crate) fn render_results(
    topic: &str,
    options: &[String],
    reactions: &[(String, u64)],
) -> String {
    let mut tallies: Vec<(u64, &str)> = options.iter().map(|o| (0, o.as_str())).collect();
    let mut off_list: Vec<(u64, &str)> = Vec::new();
    for (emoji, count) in reactions {
        match EMOJI_ORDER.iter().position(|e| e == emoji) {
            Some(index) if index < options.len() => {
                tallies[index].0 = count.saturating_sub(1);
            }
            _ => {
                if *count > 0 {
                    off_list.push((*count, emoji.as_str()));
                }
            }
        }
    }
    tallies.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    off_list.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    // Creation guarantees at least one option; a record that lost them
    // still must not panic the handler.
    let Some(&(top, _)) = tallies.first() else {
        return format!("Results of **{topic}**: no options were offered.\n");
    };
    let mut winners: Vec<&str> = tallies
        .iter()
        .take_while(|(count, _)| *count == top)
        .map(|(_, option)| *option)
        .collect();
    winners.sort_unstable();

    let mut out = format!("Results of **{topic}**:\n");

    if let Some((best_off, emoji)) = off_list.first()
        && *best_off > top
    {
        out.push_str(&format!(
            "Your options were outvoted: {emoji} leads with {best_off} {}. \
             That said, here is the actual poll:\n",
            vote_word(*best_off)
        ));
    }

    if winners.len() > 1 {
        out.push_str(&format!(
            "**Tie between {}** ({top} {} each)\n",
            winners.join(", "),
            vote_word(top)
        ));
    } else {
        out.push_str(&format!("**{}** wins! ({top} {})\n", winners[0], vote_word(top)));
    }

    for (count, option) in tallies.iter().skip(winners.len()) {
        out.push_str(&format!("**{option}**: {count} {}\n", vote_word(*count)));
    }
    for (count, emoji) in &off_list {
        out.push_str(&format!("{emoji} (off-list): {count} {}\n", vote_word(*count)));
    }

    out
}
