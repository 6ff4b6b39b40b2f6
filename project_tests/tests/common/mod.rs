//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use lib_threadwatch::configs::WatchConfig;
use lib_threadwatch::core::{DeliverySink, NewMessage, Notifier, SubscriberId, SubscriptionRegistry};
use lib_threadwatch::ingestors::ThreadPoller;
use lib_threadwatch::storage::CursorStore;
use lib_threadwatch::test_support::FakeForum;
use tokio::sync::mpsc;

pub const THREAD: &str = "https://www.mediavida.com/foro/mafia/fortaleza-frontera-iv-remake-710835";

pub fn poller(forum: &Arc<FakeForum>, saves: &Path, sink: DeliverySink) -> ThreadPoller {
    ThreadPoller::new(
        forum.address().clone(),
        forum.clone(),
        CursorStore::new(saves).unwrap(),
        Arc::new(SubscriptionRegistry::in_memory()),
        sink,
        WatchConfig::default(),
    )
}

pub fn bodies(events: &mut mpsc::Receiver<NewMessage>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event.message.body);
    }
    out
}

/// Forwards every notification as `(subscriber, body)` into a channel.
pub struct ChannelNotifier(pub mpsc::UnboundedSender<(SubscriberId, String)>);

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, subscriber: SubscriberId, event: &NewMessage) -> lib_threadwatch::Result<()> {
        let _ = self.0.send((subscriber, event.message.body.clone()));
        Ok(())
    }
}
