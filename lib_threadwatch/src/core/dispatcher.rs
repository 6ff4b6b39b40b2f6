//! # Delivery Sink and Dispatcher
//!
//! Every poller pushes the messages it decides to forward into one bounded
//! `mpsc` channel, the Delivery Sink. A single [`Dispatcher`] drains that
//! channel and fans each message out to the current subscribers of its
//! thread through a [`Notifier`].
//!
//! ## Ordering
//!
//! The dispatcher handles one event at a time and awaits each notification
//! before moving on, so messages coming from the same sweep reach every
//! subscriber in the order the poller emitted them. No ordering is promised
//! between different threads.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::registry::{SubscriberId, SubscriptionRegistry};
use crate::error::Result;
use crate::forum::{Message, ThreadAddress};

/// # New Message Event
///
/// The unit flowing through the Delivery Sink: which thread, who wrote it and
/// what they wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Canonical address of the thread the message was posted in.
    pub address: ThreadAddress,
    pub message: Message,
}

/// Sending half of the Delivery Sink, cloned into every poller.
pub type DeliverySink = mpsc::Sender<NewMessage>;

/// Creates the Delivery Sink with room for `capacity` undelivered events.
pub fn delivery_channel(capacity: usize) -> (DeliverySink, mpsc::Receiver<NewMessage>) {
    mpsc::channel(capacity.max(1))
}

/// Delivers one event to one subscriber.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subscriber: SubscriberId, event: &NewMessage) -> Result<()>;
}

#[async_trait]
impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    async fn notify(&self, subscriber: SubscriberId, event: &NewMessage) -> Result<()> {
        (**self).notify(subscriber, event).await
    }
}

/// # Core Dispatcher
///
/// The single consumer of the Delivery Sink.
pub struct Dispatcher<N> {
    registry: Arc<SubscriptionRegistry>,
    notifier: N,
}

impl<N: Notifier> Dispatcher<N> {
    pub fn new(registry: Arc<SubscriptionRegistry>, notifier: N) -> Self {
        Self { registry, notifier }
    }

    /// # Run
    ///
    /// Drains `events` until every sender has been dropped.
    ///
    /// ## Logic:
    /// 1.  Resolves the subscriber list of the event's thread under the
    ///     registry's read lock.
    /// 2.  Notifies each subscriber in subscription order.
    /// 3.  A failed notification is logged and skipped; it never stops the loop.
    ///
    /// # Returns
    /// The number of successful notifications.
    pub async fn run(self, mut events: mpsc::Receiver<NewMessage>) -> u64 {
        let mut delivered = 0u64;
        while let Some(event) = events.recv().await {
            let subscribers = self.registry.subscribers(&event.address).await;
            if subscribers.is_empty() {
                debug!(thread = %event.address, "dropping message for unwatched thread");
                continue;
            }
            for subscriber in subscribers {
                match self.notifier.notify(subscriber, &event).await {
                    Ok(()) => delivered += 1,
                    Err(e) => warn!(thread = %event.address, subscriber, "notification failed: {e}"),
                }
            }
        }
        info!(delivered, "delivery sink closed, dispatcher stopping");
        delivered
    }
}
