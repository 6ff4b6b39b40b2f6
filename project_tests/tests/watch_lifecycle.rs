//! # Watch Lifecycle Tests
//!
//! End-to-end behaviour of `WatchService`, the registry and the dispatcher:
//! pollers stop when their last subscriber leaves, keep running while
//! somebody watches, and resume from disk after a restart without
//! re-delivering old posts.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ChannelNotifier, THREAD};
use lib_threadwatch::configs::WatchConfig;
use lib_threadwatch::core::{Dispatcher, SubscriptionRegistry, delivery_channel};
use lib_threadwatch::ingestors::WatchService;
use lib_threadwatch::storage::{Cursor, CursorStore};
use lib_threadwatch::test_support::FakeForum;
use tokio::sync::mpsc;

fn moar_calls(forum: &FakeForum) -> usize {
    forum.fetched().iter().filter(|url| url.contains("moar.php")).count()
}

fn service(forum: &Arc<FakeForum>, saves: &std::path::Path, registry: Arc<SubscriptionRegistry>) -> (WatchService, mpsc::UnboundedReceiver<(i64, String)>) {
    let (sink, events) = delivery_channel(64);
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(Dispatcher::new(registry.clone(), ChannelNotifier(tx)).run(events));
    let service = WatchService::new(
        forum.clone(),
        CursorStore::new(saves).unwrap(),
        registry,
        sink,
        WatchConfig::default(),
    );
    (service, rx)
}

#[tokio::test(start_paused = true)]
async fn poller_sweeps_every_interval_while_watched() {
    let dir = tempfile::tempdir().unwrap();
    let forum = Arc::new(FakeForum::new(THREAD));
    forum.push_posts(2);
    let (service, mut notes) = service(&forum, dir.path(), Arc::new(SubscriptionRegistry::in_memory()));

    service.subscribe(forum.address(), 1).await.unwrap();
    assert_eq!(notes.recv().await.unwrap(), (1, "message 2".to_string()));

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(moar_calls(&forum), 4);

    forum.push_post("Zoe", "late news");
    assert_eq!(notes.recv().await.unwrap(), (1, "late news".to_string()));
}

#[tokio::test(start_paused = true)]
async fn poller_stops_once_the_last_subscriber_leaves() {
    let dir = tempfile::tempdir().unwrap();
    let forum = Arc::new(FakeForum::new(THREAD));
    forum.push_posts(3);
    let (service, mut notes) = service(&forum, dir.path(), Arc::new(SubscriptionRegistry::in_memory()));
    let address = forum.address().clone();

    assert!(service.subscribe(&address, 1).await.unwrap().start_poller);
    assert!(!service.subscribe(&address, 2).await.unwrap().start_poller);
    while notes.recv().await.unwrap() != (1, "message 3".to_string()) {}

    service.unsubscribe(&address, 1).await;
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert!(moar_calls(&forum) > 1, "still watched by subscriber 2");

    service.unsubscribe(&address, 2).await;
    tokio::time::sleep(Duration::from_secs(15)).await;
    let settled = forum.fetch_count();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(forum.fetch_count(), settled, "no network activity after retiring");

    // The claim was dropped, so a new subscriber gets a new poller.
    assert!(service.subscribe(&address, 3).await.unwrap().start_poller);
}

#[test]
fn restart_resumes_without_redelivering() {
    let dir = tempfile::tempdir().unwrap();
    let subscriptions = dir.path().join("subscriptions");
    let forum = Arc::new(FakeForum::new(THREAD));
    forum.push_posts(3);

    let runtime = || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap()
    };

    // First run: subscribe, receive the initial posts, then "crash".
    runtime().block_on(async {
        let registry = Arc::new(SubscriptionRegistry::load(&subscriptions).unwrap());
        let (service, mut notes) = service(&forum, dir.path(), registry);
        service.subscribe(forum.address(), 7).await.unwrap();
        assert_eq!(notes.recv().await.unwrap(), (7, "message 2".to_string()));
        assert_eq!(notes.recv().await.unwrap(), (7, "message 3".to_string()));
    });

    forum.push_posts(2);

    // Second run: everything comes back from disk.
    runtime().block_on(async {
        let registry = Arc::new(SubscriptionRegistry::load(&subscriptions).unwrap());
        assert_eq!(registry.subscribers(forum.address()).await, vec![7]);
        let (service, mut notes) = service(&forum, dir.path(), registry);

        assert_eq!(service.start_persisted().await.unwrap().len(), 1);
        assert_eq!(notes.recv().await.unwrap(), (7, "message 4".to_string()));
        assert_eq!(notes.recv().await.unwrap(), (7, "message 5".to_string()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(notes.try_recv().is_err());
        let store = CursorStore::new(dir.path()).unwrap();
        assert_eq!(store.load(forum.address()).unwrap(), Some(Cursor::new(5, 1)));
    });
}

#[tokio::test(start_paused = true)]
async fn thread_stranded_by_a_failed_login_is_polled_once_logins_recover() {
    let dir = tempfile::tempdir().unwrap();
    let forum = Arc::new(FakeForum::new(THREAD));
    forum.push_posts(3);
    let registry = Arc::new(SubscriptionRegistry::in_memory());
    let (service, mut notes) = service(&forum, dir.path(), registry.clone());
    let address = forum.address().clone();
    let resumer = tokio::spawn(service.clone().resume_stranded());

    forum.reject_logins(true);
    assert!(service.subscribe(&address, 1).await.is_err());
    forum.reject_logins(false);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(registry.has_active_subscribers(&address).await);
    assert!(forum.fetch_count() > 0, "subscribed thread never polled");
    assert_eq!(notes.recv().await.unwrap(), (1, "message 2".to_string()));
    resumer.abort();
}
