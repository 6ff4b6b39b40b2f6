//! # Cursor Persistence Tests
//!
//! The persisted cursor is the recovery point after a crash or restart: it
//! must round-trip exactly and the watermark must never move backwards.

mod common;

use std::sync::Arc;

use common::{bodies, poller, THREAD};
use lib_threadwatch::core::delivery_channel;
use lib_threadwatch::storage::{Cursor, CursorStore};
use lib_threadwatch::test_support::FakeForum;
use lib_threadwatch::ThreadAddress;

#[test]
fn cursor_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = CursorStore::new(dir.path()).unwrap();
    let address = ThreadAddress::parse(THREAD).unwrap();

    store.save(&address, &Cursor::new(42, 7)).unwrap();
    assert_eq!(store.load(&address).unwrap(), Some(Cursor::new(42, 7)));

    // Any link into the thread resolves to the same file.
    let same = ThreadAddress::parse(&format!("{THREAD}/123")).unwrap();
    assert_eq!(store.load(&same).unwrap(), Some(Cursor::new(42, 7)));
}

#[tokio::test]
async fn watermark_is_monotonic_across_restarts_and_failures() {
    let dir = tempfile::tempdir().unwrap();
    let forum = Arc::new(FakeForum::new(THREAD));
    let store = CursorStore::new(dir.path()).unwrap();
    let mut seen = 0;

    for round in 0..6 {
        forum.push_posts(4 + round);
        if round % 2 == 1 {
            // Let thread info, the incremental check and one page through.
            forum.fail_after(3);
        }

        // Every round starts from disk, as after a process restart.
        let (sink, mut events) = delivery_channel(64);
        let mut poller = poller(&forum, dir.path(), sink);
        let _ = poller.sweep().await;
        bodies(&mut events);

        let persisted = store.load(forum.address()).unwrap().unwrap_or_default();
        assert!(persisted.last_message_seq >= seen, "round {round}");
        assert!(poller.cursor().last_message_seq >= persisted.last_message_seq);
        seen = persisted.last_message_seq;
    }

    // A clean sweep catches up with everything posted.
    let (sink, _events) = delivery_channel(64);
    let mut poller = poller(&forum, dir.path(), sink);
    poller.sweep().await.unwrap();
    assert_eq!(poller.cursor().last_message_seq, (0..6).map(|r| 4 + r as u64).sum::<u64>());
}

#[tokio::test]
async fn corrupt_cursor_restarts_from_the_beginning() {
    let dir = tempfile::tempdir().unwrap();
    let forum = Arc::new(FakeForum::new(THREAD));
    forum.push_posts(3);
    let store = CursorStore::new(dir.path()).unwrap();
    std::fs::write(store.path_for(forum.address()), "not a cursor").unwrap();

    let (sink, mut events) = delivery_channel(64);
    let mut poller = poller(&forum, dir.path(), sink);
    assert_eq!(poller.cursor(), Cursor::default());

    poller.sweep().await.unwrap();
    assert_eq!(bodies(&mut events), vec!["message 2", "message 3"]);
    assert_eq!(store.load(forum.address()).unwrap(), Some(Cursor::new(3, 1)));
}
