//! # Thread Poller
//!
//! One long-running task per watched thread. Each iteration is a *sweep*:
//!
//! 1.  Resolve the thread metadata (thread id and a fresh anti-forgery token)
//!     from its first page.
//! 2.  Ask the incremental-check endpoint whether anything was posted after
//!     the watermark.
//! 3.  If so, read pages forward from the last page processed until the forum
//!     answers with a different page than the one requested (end of thread),
//!     collecting every post above the watermark.
//! 4.  Forward the newest few collected posts to the Delivery Sink and
//!     persist the cursor.
//!
//! After a sweep the poller sleeps for the poll interval and then asks the
//! registry whether anybody is still watching; if not, it retires.
//!
//! ## Key Design Principles:
//! - **Commit or nothing**: a sweep works on a copy of the cursor. Only a
//!   sweep that completes without a network or structural error replaces the
//!   in-memory cursor, delivers and persists. A failed sweep leaves both the
//!   watermark and the cursor file exactly as the last good sweep left them.
//! - **Idempotent re-scan**: posts at or below the watermark are ignored, so
//!   re-reading the last processed page never produces duplicates.
//! - **Bounded delivery**: a large backlog still advances the watermark to
//!   its newest post, but only the last `delivery_cap` posts are forwarded.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::configs::WatchConfig;
use crate::core::{DeliverySink, NewMessage, SubscriptionRegistry};
use crate::error::Result;
use crate::forum::{page, Post, ThreadAddress, ThreadInfo};
use crate::retrieve::RemoteSource;
use crate::storage::{Cursor, CursorStore};

/// Outcome of one successful sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Whether the incremental check reported new content.
    pub checked_more: bool,
    /// Posts above the previous watermark found during the sweep.
    pub discovered: usize,
    /// Posts handed to the Delivery Sink.
    pub delivered: usize,
    /// Cursor committed by the sweep.
    pub cursor: Cursor,
}

/// # Thread Poller
///
/// Owns the reading position of one thread. Everything it talks to is passed
/// in, so tests can substitute an in-memory forum.
pub struct ThreadPoller {
    address: ThreadAddress,
    source: Arc<dyn RemoteSource>,
    cursors: CursorStore,
    registry: Arc<SubscriptionRegistry>,
    sink: DeliverySink,
    config: WatchConfig,
    cursor: Cursor,
}

impl ThreadPoller {
    /// Creates a poller positioned at the persisted cursor for `address`,
    /// or at the start of the thread when none (or an unreadable one) exists.
    pub fn new(
        address: ThreadAddress,
        source: Arc<dyn RemoteSource>,
        cursors: CursorStore,
        registry: Arc<SubscriptionRegistry>,
        sink: DeliverySink,
        config: WatchConfig,
    ) -> Self {
        let cursor = match cursors.load(&address) {
            Ok(Some(cursor)) => cursor,
            Ok(None) => Cursor::default(),
            Err(e) => {
                warn!(thread = %address, "starting from scratch: {e}");
                Cursor::default()
            }
        };
        debug!(thread = %address, seq = cursor.last_message_seq, page = cursor.last_page_processed, "poller initialised");

        Self {
            address,
            source,
            cursors,
            registry,
            sink,
            config,
            cursor,
        }
    }

    pub fn address(&self) -> &ThreadAddress {
        &self.address
    }

    /// Last committed cursor.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// # Main Execution Loop
    ///
    /// Sweeps, sleeps and checks liveness until the thread has no subscribers.
    ///
    /// ## Workflow:
    /// 1.  **Sweep**: errors are logged and the iteration is abandoned; the
    ///     next attempt happens after the regular interval.
    /// 2.  **Sleep** for the poll interval.
    /// 3.  **Liveness**: `retire_if_unwatched` atomically checks for
    ///     subscribers and drops this poller's claim when there are none.
    pub async fn run(mut self) {
        info!(thread = %self.address, "poller started");

        loop {
            // --- Phase 1: Sweep ---
            match self.sweep().await {
                Ok(report) if report.discovered > 0 => info!(
                    thread = %self.address,
                    discovered = report.discovered,
                    delivered = report.delivered,
                    seq = report.cursor.last_message_seq,
                    "new messages"
                ),
                Ok(_) => debug!(thread = %self.address, "nothing new"),
                Err(e) if e.is_transient() => warn!(thread = %self.address, "sweep abandoned: {e}"),
                Err(e) => error!(thread = %self.address, "sweep failed: {e}"),
            }

            // --- Phase 2: Wait ---
            sleep(self.config.poll_interval()).await;

            // --- Phase 3: Liveness ---
            if self.registry.retire_if_unwatched(&self.address).await {
                info!(thread = %self.address, "no subscribers left, poller stopping");
                break;
            }
        }
    }

    /// Runs one sweep and commits its result.
    pub async fn sweep(&mut self) -> Result<SweepReport> {
        let info = self.resolve_info().await?;

        let mut cursor = self.cursor;
        let mut pending = Vec::new();
        let checked_more = self.check_for_more(&info, cursor.last_message_seq).await?;
        if checked_more {
            self.read_thread(cursor.start_page(), &mut cursor, &mut pending).await?;
        }

        // --- Commit ---
        self.cursor = cursor;
        let delivered = self.deliver(&pending).await;
        self.persist();

        Ok(SweepReport {
            checked_more,
            discovered: pending.len(),
            delivered,
            cursor,
        })
    }

    /// Fetches the thread's first page and reads its hidden fields.
    pub async fn resolve_info(&self) -> Result<ThreadInfo> {
        let url = self.address.as_str();
        let html = self.source.fetch(url).await?;
        let info = page::parse_thread_info(&html, url)?;
        debug!(thread = %self.address, tid = %info.thread_id, page = ?info.page, "thread info");
        Ok(info)
    }

    /// Asks the forum whether anything was posted after `last_seq`.
    pub async fn check_for_more(&self, info: &ThreadInfo, last_seq: u64) -> Result<bool> {
        let url = self.address.moar_url(&info.token, &info.thread_id, last_seq);
        let body = self.source.fetch_xhr(&url).await?;
        let more = page::parse_moar(&body, &url)?;
        debug!(thread = %self.address, last_seq, more, "incremental check");
        Ok(more)
    }

    /// # Pagination Sweep
    ///
    /// Reads pages from `start_page` onwards, appending posts above the
    /// watermark to `pending` and advancing `cursor` as it goes.
    ///
    /// ## Logic:
    /// - The forum answers a request past the last page with the last page
    ///   itself. A reported page different from the requested one therefore
    ///   means the previous page was the last and the sweep is complete.
    /// - Exception: when the very first request of the sweep is already past
    ///   the end (posts were removed, or the cursor points beyond the thread),
    ///   the answer is processed as the page it reports, once, so the cursor
    ///   realigns instead of stalling forever.
    /// - A post with an unreadable sequence number is skipped with a warning.
    pub async fn read_thread(
        &self,
        start_page: u32,
        cursor: &mut Cursor,
        pending: &mut Vec<Post>,
    ) -> Result<()> {
        let mut requested = start_page.max(1);
        let mut first = true;

        loop {
            let url = self.address.page_url(requested);
            let html = self.source.fetch(&url).await?;
            let reported = page::parse_page_number(&html, &url)?;

            let current = if reported == requested {
                requested
            } else if first && reported >= 1 && reported < requested {
                debug!(thread = %self.address, requested, reported, "start page past the end, realigning");
                reported
            } else {
                debug!(thread = %self.address, last_page = cursor.last_page_processed, "end of thread");
                return Ok(());
            };
            first = false;

            for post in page::parse_posts(&html) {
                match post {
                    Ok(post) if post.sequence > cursor.last_message_seq => {
                        cursor.last_message_seq = post.sequence;
                        pending.push(post);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(thread = %self.address, page = current, "skipping post: {e}"),
                }
            }

            cursor.last_page_processed = current;
            requested = current + 1;
        }
    }

    /// Sends the last `delivery_cap` posts of `pending` to the sink, oldest
    /// first. Returns how many were accepted.
    async fn deliver(&self, pending: &[Post]) -> usize {
        let skip = pending.len().saturating_sub(self.config.delivery_cap);
        if skip > 0 {
            debug!(thread = %self.address, skipped = skip, "delivery capped");
        }

        let mut delivered = 0;
        for post in &pending[skip..] {
            let event = NewMessage {
                address: self.address.clone(),
                message: post.message.clone(),
            };
            if self.sink.send(event).await.is_err() {
                warn!(thread = %self.address, "delivery sink closed");
                break;
            }
            delivered += 1;
        }
        delivered
    }

    fn persist(&self) {
        if let Err(e) = self.cursors.save(&self.address, &self.cursor) {
            warn!(thread = %self.address, "failed to persist cursor: {e}");
        }
    }
}
