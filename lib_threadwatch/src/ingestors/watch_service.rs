//! # Watch Service
//!
//! Supervises the pollers. It holds the dependencies every poller shares,
//! decides when a poller has to be started and makes sure the forum session
//! is established before any poller issues a request.
//!
//! A failed login leaves subscriptions recorded but without a poller. They
//! are picked up by the next successful login, whether it comes from a new
//! subscription or from the periodic [`WatchService::resume_stranded`] loop.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::configs::WatchConfig;
use crate::core::{AddOutcome, DeliverySink, SubscriberId, SubscriptionRegistry};
use crate::error::Result;
use crate::forum::ThreadAddress;
use crate::ingestors::thread_poller::ThreadPoller;
use crate::retrieve::RemoteSource;
use crate::storage::CursorStore;

/// # Watch Service
///
/// Entry point used by front ends: subscribe, unsubscribe and resume the
/// watches persisted by a previous run.
#[derive(Clone)]
pub struct WatchService {
    source: Arc<dyn RemoteSource>,
    cursors: CursorStore,
    registry: Arc<SubscriptionRegistry>,
    sink: DeliverySink,
    config: WatchConfig,
}

impl WatchService {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        cursors: CursorStore,
        registry: Arc<SubscriptionRegistry>,
        sink: DeliverySink,
        config: WatchConfig,
    ) -> Self {
        Self {
            source,
            cursors,
            registry,
            sink,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Starts a poller for every watched thread that has none.
    ///
    /// The session is established once, before the first poller is spawned.
    /// On authentication failure no poller is started and every claim is
    /// released, so a later call (or subscription) can try again.
    pub async fn start_persisted(&self) -> Result<Vec<JoinHandle<()>>> {
        let idle = self.registry.claim_idle_resources().await;
        if idle.is_empty() {
            return Ok(Vec::new());
        }

        if let Err(e) = self.source.authenticate().await {
            error!("cannot resume {} watched threads: {e}", idle.len());
            for address in &idle {
                self.registry.release(address).await;
            }
            return Err(e);
        }

        info!("resuming {} watched threads", idle.len());
        Ok(idle.into_iter().map(|address| self.spawn_poller(address)).collect())
    }

    /// Subscribes `subscriber` to `address`, starting a poller when the thread
    /// has none.
    ///
    /// # Errors
    /// [`crate::error::WatchError::AuthenticationFailed`] when a poller was
    /// needed but the session could not be established. The subscription
    /// itself stays recorded and its poller starts with the next successful
    /// attempt.
    ///
    /// A successful login also starts pollers for every other watched thread
    /// left without one by an earlier failure.
    pub async fn subscribe(&self, address: &ThreadAddress, subscriber: SubscriberId) -> Result<AddOutcome> {
        let outcome = self.registry.add(address, subscriber).await;
        if outcome.newly_subscribed {
            info!(thread = %address, subscriber, "subscribed");
        }

        if outcome.start_poller {
            if let Err(e) = self.source.authenticate().await {
                self.registry.release(address).await;
                error!(thread = %address, "poller not started: {e}");
                return Err(e);
            }
            self.spawn_poller(address.clone());
            self.spawn_idle().await;
        }
        Ok(outcome)
    }

    /// Retries [`WatchService::start_persisted`] every `resume_interval` for
    /// as long as the returned future is polled.
    pub async fn resume_stranded(self) {
        let mut ticker = interval(self.config.resume_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.start_persisted().await {
                Ok(handles) if !handles.is_empty() => info!("{} stranded threads resumed", handles.len()),
                Ok(_) => {}
                Err(e) => debug!("stranded threads still waiting: {e}"),
            }
        }
    }

    /// Removes the subscription. The poller notices on its next liveness check.
    pub async fn unsubscribe(&self, address: &ThreadAddress, subscriber: SubscriberId) -> bool {
        let removed = self.registry.remove(address, subscriber).await;
        if removed {
            info!(thread = %address, subscriber, "unsubscribed");
        }
        removed
    }

    /// Starts pollers for watched threads without one. Only called once the
    /// session is established.
    async fn spawn_idle(&self) {
        let idle = self.registry.claim_idle_resources().await;
        if !idle.is_empty() {
            info!("starting {} stranded watched threads", idle.len());
        }
        for address in idle {
            self.spawn_poller(address);
        }
    }

    fn spawn_poller(&self, address: ThreadAddress) -> JoinHandle<()> {
        let poller = ThreadPoller::new(
            address,
            self.source.clone(),
            self.cursors.clone(),
            self.registry.clone(),
            self.sink.clone(),
            self.config.clone(),
        );
        tokio::spawn(poller.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::delivery_channel;
    use crate::error::WatchError;
    use crate::test_support::FakeForum;
    use std::time::Duration;

    const THREAD: &str = "https://www.mediavida.com/foro/mafia/fortaleza-frontera-iv-remake-710835";

    fn service(forum: &Arc<FakeForum>, dir: &tempfile::TempDir) -> (WatchService, tokio::sync::mpsc::Receiver<crate::core::NewMessage>) {
        let (sink, events) = delivery_channel(64);
        let service = WatchService::new(
            forum.clone(),
            CursorStore::new(dir.path()).unwrap(),
            Arc::new(SubscriptionRegistry::in_memory()),
            sink,
            WatchConfig::default(),
        );
        (service, events)
    }

    #[tokio::test(start_paused = true)]
    async fn one_poller_per_thread() {
        let dir = tempfile::tempdir().unwrap();
        let forum = Arc::new(FakeForum::new(THREAD));
        forum.push_posts(3);
        let (service, mut events) = service(&forum, &dir);
        let address = forum.address().clone();

        assert!(service.subscribe(&address, 1).await.unwrap().start_poller);
        assert!(!service.subscribe(&address, 2).await.unwrap().start_poller);

        let first = events.recv().await.unwrap();
        assert_eq!(first.message.body, "message 2");
        assert_eq!(events.recv().await.unwrap().message.body, "message 3");
        assert_eq!(forum.auth_calls(), 1);
    }

    #[tokio::test]
    async fn failed_login_releases_the_claim() {
        let dir = tempfile::tempdir().unwrap();
        let forum = Arc::new(FakeForum::new(THREAD));
        forum.reject_logins(true);
        let (service, _events) = service(&forum, &dir);
        let address = forum.address().clone();

        let err = service.subscribe(&address, 1).await.unwrap_err();
        assert!(matches!(err, WatchError::AuthenticationFailed(_)));
        assert!(service.registry().has_active_subscribers(&address).await);
        assert_eq!(forum.fetch_count(), 0);

        forum.reject_logins(false);
        let handles = service.start_persisted().await.unwrap();
        assert_eq!(handles.len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_reports_whether_anything_changed() {
        let dir = tempfile::tempdir().unwrap();
        let forum = Arc::new(FakeForum::new(THREAD));
        let (service, _events) = service(&forum, &dir);
        let address = forum.address().clone();

        assert!(!service.unsubscribe(&address, 1).await);
        service.subscribe(&address, 1).await.unwrap();
        assert!(service.unsubscribe(&address, 1).await);
        assert!(!service.registry().has_active_subscribers(&address).await);
    }

    #[tokio::test(start_paused = true)]
    async fn login_for_another_thread_starts_the_stranded_one() {
        let dir = tempfile::tempdir().unwrap();
        let forum = Arc::new(FakeForum::new(THREAD));
        forum.push_posts(2);
        let (service, mut events) = service(&forum, &dir);
        let stranded = forum.address().clone();
        let other = ThreadAddress::parse("https://www.mediavida.com/foro/mafia/another-thread-1").unwrap();

        forum.reject_logins(true);
        assert!(service.subscribe(&stranded, 1).await.is_err());
        forum.reject_logins(false);

        assert!(service.subscribe(&other, 1).await.unwrap().start_poller);
        let event = events.recv().await.unwrap();
        assert_eq!(event.address, stranded);
        assert_eq!(event.message.body, "message 2");
        assert!(service.registry().claim_idle_resources().await.is_empty(), "every watched thread has a poller");
    }

    #[tokio::test(start_paused = true)]
    async fn resume_loop_picks_up_threads_after_the_login_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let forum = Arc::new(FakeForum::new(THREAD));
        forum.push_posts(2);
        let (service, mut events) = service(&forum, &dir);
        let address = forum.address().clone();

        forum.reject_logins(true);
        assert!(service.subscribe(&address, 1).await.is_err());
        let resumer = tokio::spawn(service.clone().resume_stranded());

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(forum.fetch_count(), 0, "no poller while logins fail");
        assert!(forum.auth_calls() >= 3, "the loop keeps retrying");

        forum.reject_logins(false);
        assert_eq!(events.recv().await.unwrap().message.body, "message 2");
        assert!(forum.fetch_count() > 0);
        resumer.abort();
    }
}
