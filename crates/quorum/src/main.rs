//! Quorum: a community chat bot for scheduled events, polls, and birthdays.
//!
//! Everything user-visible rides on the deferred-job registry in
//! `quorum-scheduler`: event announcements and poll resolutions are one-shot
//! jobs, the birthday scan is a recurring daily job.

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod birthdays;
mod commands;
mod console;
mod daemon;
mod handlers;
#[cfg(test)]
mod testutil;

#[derive(Parser)]
#[command(name = "quorum")]
#[command(about = "Community chat bot: events, polls, birthdays", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot daemon: timing loop, birthday refresh, command dispatch
    Daemon {
        /// Redis URL for the shared job registry and locks
        #[arg(long, env = "QUORUM_REDIS_URL", default_value = "redis://127.0.0.1/")]
        redis_url: String,

        /// Use in-process stores instead of redis (dev / single node)
        #[arg(long)]
        memory: bool,

        /// Channel for birthday announcements
        #[arg(long, env = "QUORUM_ANNOUNCEMENT_CHANNEL", default_value = "announcements")]
        announcement_channel: String,

        /// Key prefix in the shared store
        #[arg(long, env = "QUORUM_KEY_PREFIX", default_value = "quorum")]
        key_prefix: String,

        /// Seconds between birthday list refreshes (default 48h)
        #[arg(long, default_value_t = 172_800)]
        birthday_refresh_secs: u64,

        /// Bound on lock acquisition wait, in milliseconds
        #[arg(long, default_value_t = 5_000)]
        lock_wait_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "quorum=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            redis_url,
            memory,
            announcement_channel,
            key_prefix,
            birthday_refresh_secs,
            lock_wait_ms,
        } => {
            daemon::run(daemon::DaemonConfig {
                redis_url,
                memory,
                announcement_channel,
                key_prefix,
                birthday_refresh_secs,
                lock_wait_ms,
            })
            .await
        }
    }
}
