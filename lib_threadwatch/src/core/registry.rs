//! # Subscription Registry
//!
//! Source of truth for which threads are watched and by whom. Every watched
//! thread also carries a "poller running" flag so that at most one poller
//! exists per thread: whoever flips the flag from `false` to `true` owns
//! starting it, and the poller clears it again when it retires.
//!
//! Readers (pollers checking liveness, the dispatcher resolving recipients)
//! take the read lock. Writers take the write lock and, when the registry is
//! backed by a file, render its new contents before releasing it. The file
//! itself is written on the blocking pool after the lock is released; a
//! separate writer lock, taken before the map lock is dropped, keeps the
//! writes in the same order as the changes.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::sync::{Mutex, RwLock, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::error::{Result, WatchError};
use crate::forum::ThreadAddress;

/// Identifier of a subscriber (a chat id for the Telegram front end).
pub type SubscriberId = i64;

#[derive(Debug)]
struct Entry {
    address: ThreadAddress,
    subscribers: Vec<SubscriberId>,
    poller_running: bool,
}

impl Entry {
    fn new(address: ThreadAddress) -> Self {
        Self {
            address,
            subscribers: Vec::new(),
            poller_running: false,
        }
    }
}

/// Result of [`SubscriptionRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    /// `false` when the subscriber was already watching the thread.
    pub newly_subscribed: bool,
    /// `true` when no poller was running; the caller must start one, or call
    /// [`SubscriptionRegistry::release`] if it cannot.
    pub start_poller: bool,
}

/// # Subscription Registry
///
/// Maps canonical thread addresses to their ordered subscriber lists.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<BTreeMap<String, Entry>>,
    path: Option<PathBuf>,
    /// Serialises file writes.
    writer: Mutex<()>,
}

impl SubscriptionRegistry {
    /// A registry that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the registry from `path` and keeps it in sync with that file.
    /// A missing file yields an empty registry; unreadable lines are skipped.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut entries = BTreeMap::new();

        match fs::read_to_string(&path) {
            Ok(text) => {
                for (lineno, line) in text.lines().enumerate() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match parse_line(line) {
                        Some((address, subscribers)) if !subscribers.is_empty() => {
                            info!(thread = %address, subscribers = subscribers.len(), "loaded subscription");
                            let entry = entries
                                .entry(address.as_str().to_string())
                                .or_insert_with(|| Entry::new(address));
                            for id in subscribers {
                                if !entry.subscribers.contains(&id) {
                                    entry.subscribers.push(id);
                                }
                            }
                        }
                        Some(_) => debug!(line = lineno + 1, "subscription line without subscribers"),
                        None => warn!(path = %path.display(), line = lineno + 1, "skipping unreadable subscription line"),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no subscription file yet");
            }
            Err(e) => return Err(e.into()),
        }

        info!("loaded {} subscriptions", entries.len());
        Ok(Self {
            entries: RwLock::new(entries),
            path: Some(path),
            writer: Mutex::new(()),
        })
    }

    /// Records `subscriber` as a watcher of `address`.
    pub async fn add(&self, address: &ThreadAddress, subscriber: SubscriberId) -> AddOutcome {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(address.as_str().to_string())
            .or_insert_with(|| Entry::new(address.clone()));

        let newly_subscribed = !entry.subscribers.contains(&subscriber);
        if newly_subscribed {
            entry.subscribers.push(subscriber);
        }
        let start_poller = !entry.poller_running;
        entry.poller_running = true;

        if newly_subscribed {
            self.persist_after(entries).await;
        }
        AddOutcome {
            newly_subscribed,
            start_poller,
        }
    }

    /// Removes `subscriber` from `address`. Returns `false` if it was not
    /// subscribed.
    pub async fn remove(&self, address: &ThreadAddress, subscriber: SubscriberId) -> bool {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(address.as_str()) else {
            return false;
        };
        let before = entry.subscribers.len();
        entry.subscribers.retain(|id| *id != subscriber);
        let removed = entry.subscribers.len() != before;

        // A running poller keeps its entry until it observes the empty list.
        if entry.subscribers.is_empty() && !entry.poller_running {
            entries.remove(address.as_str());
        }
        if removed {
            self.persist_after(entries).await;
        }
        removed
    }

    pub async fn has_active_subscribers(&self, address: &ThreadAddress) -> bool {
        self.entries
            .read()
            .await
            .get(address.as_str())
            .is_some_and(|entry| !entry.subscribers.is_empty())
    }

    /// Subscribers of `address` in subscription order.
    pub async fn subscribers(&self, address: &ThreadAddress) -> Vec<SubscriberId> {
        self.entries
            .read()
            .await
            .get(address.as_str())
            .map(|entry| entry.subscribers.clone())
            .unwrap_or_default()
    }

    /// Threads watched by `subscriber`.
    pub async fn subscriptions_of(&self, subscriber: SubscriberId) -> Vec<ThreadAddress> {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.subscribers.contains(&subscriber))
            .map(|entry| entry.address.clone())
            .collect()
    }

    /// Number of threads with at least one subscriber.
    pub async fn len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| !entry.subscribers.is_empty())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Marks every watched thread without a poller as running and returns
    /// them. The caller owns starting a poller for each.
    pub async fn claim_idle_resources(&self) -> Vec<ThreadAddress> {
        let mut entries = self.entries.write().await;
        entries
            .values_mut()
            .filter(|entry| !entry.subscribers.is_empty() && !entry.poller_running)
            .map(|entry| {
                entry.poller_running = true;
                entry.address.clone()
            })
            .collect()
    }

    /// Gives back a claim that did not result in a running poller.
    pub async fn release(&self, address: &ThreadAddress) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(address.as_str()) {
            entry.poller_running = false;
            if entry.subscribers.is_empty() {
                entries.remove(address.as_str());
            }
        }
    }

    /// Liveness check run by a poller between sweeps.
    ///
    /// When `address` has no subscribers left the poller's claim is dropped in
    /// the same critical section and `true` is returned: the poller must stop.
    /// A subscriber arriving afterwards finds no running poller and starts a
    /// new one.
    pub async fn retire_if_unwatched(&self, address: &ThreadAddress) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(address.as_str()) {
            Some(entry) if !entry.subscribers.is_empty() => false,
            Some(_) => {
                entries.remove(address.as_str());
                true
            }
            None => true,
        }
    }

    /// Writes the registry to its file now.
    pub async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let entries = self.entries.read().await;
        let contents = render(&entries);
        let _writer = self.writer.lock().await;
        drop(entries);
        write_file(path.clone(), contents).await
    }

    /// Renders `entries` and releases the map lock before touching the disk.
    async fn persist_after(&self, entries: RwLockWriteGuard<'_, BTreeMap<String, Entry>>) {
        let Some(path) = &self.path else {
            return;
        };
        let contents = render(&entries);
        let _writer = self.writer.lock().await;
        drop(entries);
        match write_file(path.clone(), contents).await {
            Ok(()) => debug!(path = %path.display(), "subscriptions saved"),
            Err(e) => warn!(path = %path.display(), "failed to save subscriptions: {e}"),
        }
    }
}

/// `<address> <id>,<id>,`
fn parse_line(line: &str) -> Option<(ThreadAddress, Vec<SubscriberId>)> {
    let (address, ids) = line.split_once(char::is_whitespace)?;
    let address = ThreadAddress::parse(address).ok()?;
    let mut subscribers = Vec::new();
    for id in ids.trim().split(',').map(str::trim).filter(|id| !id.is_empty()) {
        match id.parse() {
            Ok(id) => subscribers.push(id),
            Err(_) => warn!(thread = %address, "ignoring bad subscriber id {id:?}"),
        }
    }
    Some((address, subscribers))
}

fn render(entries: &BTreeMap<String, Entry>) -> String {
    let mut out = String::new();
    for entry in entries.values().filter(|entry| !entry.subscribers.is_empty()) {
        out.push_str(entry.address.as_str());
        out.push(' ');
        for id in &entry.subscribers {
            out.push_str(&id.to_string());
            out.push(',');
        }
        out.push('\n');
    }
    out
}

/// Atomically replaces `path` with `contents` on the blocking pool.
async fn write_file(path: PathBuf, contents: String) -> Result<()> {
    tokio::task::spawn_blocking(move || write_file_sync(&path, &contents))
        .await
        .map_err(|e| WatchError::Io(std::io::Error::other(e)))?
}

fn write_file_sync(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "https://www.mediavida.com/foro/mafia/thread-a-1";
    const B: &str = "https://www.mediavida.com/foro/off-topic/thread-b-2";

    fn addr(raw: &str) -> ThreadAddress {
        ThreadAddress::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn first_subscriber_claims_the_poller() {
        let registry = SubscriptionRegistry::in_memory();
        let first = registry.add(&addr(A), 10).await;
        assert_eq!(first, AddOutcome { newly_subscribed: true, start_poller: true });

        let second = registry.add(&addr(A), 20).await;
        assert_eq!(second, AddOutcome { newly_subscribed: true, start_poller: false });

        let again = registry.add(&addr(A), 10).await;
        assert_eq!(again, AddOutcome { newly_subscribed: false, start_poller: false });
        assert_eq!(registry.subscribers(&addr(A)).await, vec![10, 20]);
    }

    #[tokio::test]
    async fn retire_only_when_nobody_is_left() {
        let registry = SubscriptionRegistry::in_memory();
        registry.add(&addr(A), 1).await;
        registry.add(&addr(A), 2).await;

        assert!(registry.remove(&addr(A), 1).await);
        assert!(!registry.remove(&addr(A), 1).await);
        assert!(!registry.retire_if_unwatched(&addr(A)).await);

        registry.remove(&addr(A), 2).await;
        assert!(!registry.has_active_subscribers(&addr(A)).await);
        assert!(registry.retire_if_unwatched(&addr(A)).await);

        // The claim is gone, so the next subscriber starts a fresh poller.
        assert!(registry.add(&addr(A), 3).await.start_poller);
    }

    #[tokio::test]
    async fn released_claims_can_be_taken_again() {
        let registry = SubscriptionRegistry::in_memory();
        assert!(registry.add(&addr(A), 1).await.start_poller);
        registry.release(&addr(A)).await;
        assert!(registry.add(&addr(A), 1).await.start_poller);

        registry.release(&addr(A)).await;
        assert_eq!(registry.claim_idle_resources().await, vec![addr(A)]);
        assert!(registry.claim_idle_resources().await.is_empty());
    }

    #[tokio::test]
    async fn persists_and_reloads_the_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriptions");

        let registry = SubscriptionRegistry::load(&path).unwrap();
        assert!(registry.is_empty().await);
        registry.add(&addr(A), 5).await;
        registry.add(&addr(A), -100123).await;
        registry.add(&addr(B), 7).await;
        registry.remove(&addr(B), 7).await;

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, format!("{A} 5,-100123,\n"));

        let reloaded = SubscriptionRegistry::load(&path).unwrap();
        assert_eq!(reloaded.subscribers(&addr(A)).await, vec![5, -100123]);
        assert_eq!(reloaded.len().await, 1);
        assert_eq!(reloaded.claim_idle_resources().await, vec![addr(A)]);
    }

    #[tokio::test]
    async fn load_skips_bad_lines_and_canonicalizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriptions");
        fs::write(
            &path,
            format!("garbage\n{A}/12 1,x,2,\nhttps://example.com/nope 3,\n{B} \n"),
        )
        .unwrap();

        let registry = SubscriptionRegistry::load(&path).unwrap();
        assert_eq!(registry.subscribers(&addr(A)).await, vec![1, 2]);
        assert!(!registry.has_active_subscribers(&addr(B)).await);
        assert_eq!(registry.subscriptions_of(2).await, vec![addr(A)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_changes_reach_the_file_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriptions");
        let registry = std::sync::Arc::new(SubscriptionRegistry::load(&path).unwrap());

        let tasks: Vec<_> = (0..32)
            .map(|id| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.add(&addr(A), id).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert!(registry.remove(&addr(A), 0).await);

        assert_eq!(registry.subscribers(&addr(A)).await.len(), 31);

        let reloaded = SubscriptionRegistry::load(&path).unwrap();
        let mut ids = reloaded.subscribers(&addr(A)).await;
        ids.sort_unstable();
        assert_eq!(ids, (1..32).collect::<Vec<SubscriberId>>());
    }
}
