//! The daemon: wires the stores, timing loop, birthday refresh, and command
//! dispatch together and runs until ctrl-c or the command source closes.
//!
//! Tasks:
//! - the scheduler's timing loop (fires due jobs)
//! - a birthday list refresh on a long interval, lock-guarded so only one
//!   bot process hits the upstream source per round
//! - one short-lived task per incoming command, so a slow command never
//!   delays the next one

use std::sync::Arc;
use std::time::Duration;

use miette::Result;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use quorum_chat::{BirthdaySource, ChannelId, ChatGateway, CommandSource, UserId};
use quorum_scheduler::{
    Job, JobArgs, JobKind, JobStore, LockBackend, LockRegistry, MemoryJobStore, MemoryLockBackend,
    RedisJobStore, RedisLockBackend, Scheduler, SchedulerError,
};

use crate::birthdays::BirthdayBook;
use crate::commands::Coordinator;
use crate::console::{ConsoleCommands, ConsoleGateway, NoBirthdays};
use crate::handlers;

/// Lock key for the birthday refresh round.
const BIRTHDAY_REFRESH_LOCK: &str = "birthdays:refresh";

/// Identity that owns bot-created recurring jobs.
const BOT_USER: &str = "quorum";

pub struct DaemonConfig {
    pub redis_url: String,
    pub memory: bool,
    pub announcement_channel: String,
    pub key_prefix: String,
    pub birthday_refresh_secs: u64,
    pub lock_wait_ms: u64,
}

/// Run the daemon on the console transport.
pub async fn run(config: DaemonConfig) -> Result<()> {
    let gateway: Arc<dyn ChatGateway> = Arc::new(ConsoleGateway::new());
    let source = Box::new(ConsoleCommands::new());
    let birthday_source: Arc<dyn BirthdaySource> = Arc::new(NoBirthdays);
    run_with(config, gateway, source, birthday_source).await
}

/// Run the daemon on the given transport.
pub async fn run_with(
    config: DaemonConfig,
    gateway: Arc<dyn ChatGateway>,
    mut source: Box<dyn CommandSource>,
    birthday_source: Arc<dyn BirthdaySource>,
) -> Result<()> {
    let (store, lock_backend): (Arc<dyn JobStore>, Arc<dyn LockBackend>) = if config.memory {
        info!("using in-process stores");
        (
            Arc::new(MemoryJobStore::new()),
            Arc::new(MemoryLockBackend::new()),
        )
    } else {
        info!(url = %config.redis_url, "connecting to redis");
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| miette::miette!("invalid redis url: {}", e))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| miette::miette!("failed to connect to redis: {}", e))?;
        (
            Arc::new(RedisJobStore::new(conn.clone(), &config.key_prefix)),
            Arc::new(RedisLockBackend::new(conn, &config.key_prefix)),
        )
    };

    let locks = LockRegistry::new(lock_backend)
        .with_wait_timeout(Duration::from_millis(config.lock_wait_ms));
    let scheduler = Arc::new(Scheduler::new(store));
    let book = Arc::new(BirthdayBook::new(birthday_source));

    ensure_birthday_scan(&scheduler)
        .await
        .map_err(|e| miette::miette!("could not ensure birthday scan job: {}", e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(%error, "could not listen for ctrl-c");
                return;
            }
            info!("received ctrl-c, shutting down");
            let _ = shutdown_tx.send(true);
        });
    }

    let scheduler_handle = {
        let scheduler = Arc::clone(&scheduler);
        let handlers = handlers::handler_table(
            Arc::clone(&gateway),
            Arc::clone(&book),
            ChannelId(config.announcement_channel.clone()),
        );
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx, handlers).await })
    };

    let refresh_handle = {
        let locks = locks.clone();
        let book = Arc::clone(&book);
        let mut shutdown_rx = shutdown_rx.clone();
        let every = Duration::from_secs(config.birthday_refresh_secs.max(1));
        tokio::spawn(async move {
            // First tick is immediate, so the cache is warm from startup.
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => refresh_birthdays(&locks, &book).await,
                }
            }
        })
    };

    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&scheduler),
        locks,
        Arc::clone(&gateway),
    ));

    info!("daemon ready");
    let mut shutdown_commands = shutdown_rx.clone();
    loop {
        tokio::select! {
            biased;

            _ = shutdown_commands.changed() => {
                if *shutdown_commands.borrow() {
                    break;
                }
            }
            event = source.next() => {
                let Some(event) = event else {
                    info!("command source closed");
                    break;
                };
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move { coordinator.dispatch(event).await });
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(error) = scheduler_handle.await {
        warn!(%error, "scheduler task panicked");
    }
    if let Err(error) = refresh_handle.await {
        warn!(%error, "birthday refresh task panicked");
    }
    info!("daemon stopped");
    Ok(())
}

/// Create the recurring daily birthday scan if no prior run left one behind.
async fn ensure_birthday_scan(scheduler: &Scheduler) -> Result<(), SchedulerError> {
    let existing = scheduler.store().list_all().await?;
    if existing.iter().any(|j| j.kind() == JobKind::BirthdayScan) {
        debug!("birthday scan job already present");
        return Ok(());
    }
    let job = scheduler
        .schedule(Job::daily(JobArgs::BirthdayScan, 0, 0, UserId::from(BOT_USER)))
        .await?;
    info!(id = %job.id, "created recurring birthday scan job");
    Ok(())
}

/// One lock-guarded refresh round. Losing the lock means another process is
/// already on it; this round is skipped, not retried.
async fn refresh_birthdays(locks: &LockRegistry, book: &BirthdayBook) {
    let guard = match locks.acquire(BIRTHDAY_REFRESH_LOCK).await {
        Ok(guard) => guard,
        Err(SchedulerError::LockTimeout(_)) => {
            debug!("another process is refreshing the birthday list");
            return;
        }
        Err(error) => {
            warn!(%error, "could not take the birthday refresh lock");
            return;
        }
    };

    if let Err(error) = book.refresh().await {
        warn!(%error, "birthday refresh failed; keeping the stale list");
    }
    if let Err(error) = guard.release().await {
        warn!(%error, "failed to release the birthday refresh lock");
    }
}
