//! # Thread Watch Server
//!
//! Watches forum threads and forwards newly posted messages to the Telegram
//! chats subscribed to them.
//!
//! ## Key Features:
//! - **One poller per thread**: every watched thread is swept on a fixed
//!   interval by its own task, all sharing one forum session.
//! - **Durable state**: per-thread cursors and the subscription list live in
//!   the saves directory, so a restart neither re-delivers nor skips posts.
//! - **Chat commands**: `/s <url>` and `/u <url>` manage subscriptions.
//! - **Graceful Shutdown**: integrates `tokio-graceful`; the bot stops on
//!   Ctrl-C/SIGTERM and in-flight sweeps are abandoned, resuming from the last
//!   persisted cursor on the next start.

use std::sync::Arc;

use anyhow::Result;
use lib_threadwatch::core::{Dispatcher, SubscriptionRegistry, delivery_channel};
use lib_threadwatch::ingestors::WatchService;
use lib_threadwatch::loggers::setup_logging;
use lib_threadwatch::retrieve::{ForumClient, RemoteSource};
use lib_threadwatch::storage::CursorStore;
use tokio_graceful::Shutdown;
use tracing::{error, info, warn};

mod threadwatch_logic;
use threadwatch_logic::bot::Bot;
use threadwatch_logic::config;
use threadwatch_logic::telegram::{TelegramApi, TelegramNotifier};

#[tokio::main]
/// # Main Entry Point
///
/// 1.  Loads `.env`, then the layered configuration.
/// 2.  Sets up structured logging (console and daily JSON files).
/// 3.  Builds the forum session, cursor store, subscription registry and
///     Delivery Sink, and starts the dispatcher.
/// 4.  Resumes the pollers of persisted subscriptions, then keeps retrying
///     for threads left without a poller by a failed login.
/// 5.  Runs the Telegram bot under `tokio-graceful` until a shutdown signal.
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = config::load_config();
    let _log_guard = setup_logging(&config.logging_options())?;

    let token = config.telegram_token()?.to_string();
    let forum = config.forum_config();
    let watch = config.watch_config();

    let source: Arc<dyn RemoteSource> = Arc::new(ForumClient::new(forum.clone())?);
    let cursors = CursorStore::new(&watch.saves_dir)?;
    let registry = Arc::new(SubscriptionRegistry::load(watch.subscriptions_path())?);
    let (sink, events) = delivery_channel(watch.sink_capacity);
    let service = WatchService::new(source, cursors, registry.clone(), sink, watch);

    let api = Arc::new(TelegramApi::new(config.telegram_api_url(), &token)?);
    let me = api.get_me().await?;

    // Pollers never drop their sink, so the dispatcher lives as long as the process.
    tokio::spawn(Dispatcher::new(registry.clone(), TelegramNotifier::new(api.clone())).run(events));

    match service.start_persisted().await {
        Ok(pollers) => info!("{} pollers resumed", pollers.len()),
        Err(e) => error!("persisted subscriptions not resumed: {e}"),
    }

    let shutdown: Shutdown = Shutdown::default();
    let resumer = service.clone();
    shutdown.spawn_task_fn(move |guard| async move {
        tokio::select! {
            _ = guard.cancelled() => {}
            _ = resumer.resume_stranded() => {}
        }
    });
    let bot = Bot::new(api, service, forum.base_url, me.username);
    shutdown.spawn_task_fn(move |guard| bot.run(guard));

    match shutdown.shutdown_with_limit(config.shutdown_timeout()).await {
        Ok(elapsed) => info!(
            "shutdown: gracefully {}s after shutdown signal received",
            elapsed.as_secs_f64()
        ),
        Err(e) => warn!("shutdown: forcefully due to timeout: {}", e),
    }

    if let Err(e) = registry.persist().await {
        error!("failed to save subscriptions on exit: {e}");
    }
    Ok(())
}
