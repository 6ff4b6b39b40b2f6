use std::sync::Arc;
use std::time::Duration;

use lib_threadwatch::ingestors::WatchService;
use tokio_graceful::ShutdownGuard;
use tracing::{debug, info, warn};

use super::commands::{handle_command, parse_command};
use super::telegram::{TelegramApi, Update};

/// Long-poll window for `getUpdates`.
const POLL_TIMEOUT_SECS: u64 = 9;
/// Pause after a failed `getUpdates` call.
const ERROR_DELAY: Duration = Duration::from_secs(5);

/// The Telegram front end: reads commands and answers them.
pub struct Bot {
    api: Arc<TelegramApi>,
    service: WatchService,
    forum_url: String,
    username: Option<String>,
}

impl Bot {
    pub fn new(api: Arc<TelegramApi>, service: WatchService, forum_url: String, username: Option<String>) -> Self {
        Self {
            api,
            service,
            forum_url,
            username,
        }
    }

    /// Polls for updates until the shutdown signal fires. Updates queued while
    /// the bot was offline are skipped.
    pub async fn run(self, shutdown_guard: ShutdownGuard) {
        let mut offset = match self.api.drop_pending_updates().await {
            Ok(offset) => offset,
            Err(e) => {
                warn!("could not drop pending updates: {e:#}");
                0
            }
        };
        info!("@{} has been started...", self.username.as_deref().unwrap_or("bot"));

        loop {
            let result = tokio::select! {
                _ = shutdown_guard.cancelled() => {
                    info!("Signal received: stopping the bot");
                    break;
                }
                result = self.api.get_updates(offset, POLL_TIMEOUT_SECS) => result,
            };

            match result {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(update).await;
                    }
                }
                Err(e) => {
                    warn!("getUpdates failed: {e:#}");
                    tokio::select! {
                        _ = shutdown_guard.cancelled() => break,
                        _ = tokio::time::sleep(ERROR_DELAY) => {}
                    }
                }
            }
        }
    }

    async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let Some(command) = parse_command(text, self.username.as_deref()) else {
            debug!(chat = message.chat.id, "ignoring non-command message");
            return;
        };

        info!(chat = message.chat.id, kind = ?command.kind, args = ?command.args, "command received");
        let reply = handle_command(&self.service, &self.forum_url, message.chat.id, &command).await;
        if let Err(e) = self.api.send_message(message.chat.id, &reply).await {
            warn!(chat = message.chat.id, "failed to send reply: {e:#}");
        }
    }
}
