//! # Watch Configuration
//!
//! Plain settings structs consumed by the library. Binaries assemble them
//! from their own layered configuration (defaults, config file, CLI/env).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default forum origin; thread addresses live under `<origin>/foro/...`.
pub const DEFAULT_FORUM_URL: &str = "https://www.mediavida.com";

/// Shortest interval a poller or the resume loop will wait between rounds.
pub const MIN_INTERVAL_SECS: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// # Forum Configuration
///
/// Connection and credential settings for the remote forum session.
pub struct ForumConfig {
    /// Scheme and host of the forum, e.g. `https://www.mediavida.com`.
    pub base_url: String,
    /// Account name. An empty name runs the session anonymously.
    pub username: String,
    /// Account password.
    #[serde(skip_serializing)]
    pub password: String,
    /// Text that must appear in the login response for the login to count.
    pub auth_marker: String,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FORUM_URL.to_string(),
            username: String::new(),
            password: String::new(),
            auth_marker: "logout".to_string(),
            user_agent: concat!("threadwatch/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 15,
        }
    }
}

impl ForumConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `true` when no account name is configured.
    pub fn is_anonymous(&self) -> bool {
        self.username.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// # Watch Configuration
///
/// Scheduling and delivery settings shared by every thread poller.
pub struct WatchConfig {
    /// Seconds between two sweeps of the same thread. Values below
    /// [`MIN_INTERVAL_SECS`] are raised to it.
    pub poll_interval_secs: u64,
    /// Seconds between two attempts to start pollers for watched threads
    /// that have none, e.g. after a failed login.
    pub resume_interval_secs: u64,
    /// Maximum number of newly discovered messages forwarded per sweep.
    pub delivery_cap: usize,
    /// Directory holding cursor files and the subscription list.
    pub saves_dir: PathBuf,
    /// Capacity of the channel between pollers and the dispatcher.
    pub sink_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            resume_interval_secs: 60,
            delivery_cap: 10,
            saves_dir: PathBuf::from("saves"),
            sink_capacity: 256,
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(MIN_INTERVAL_SECS))
    }

    pub fn resume_interval(&self) -> Duration {
        Duration::from_secs(self.resume_interval_secs.max(MIN_INTERVAL_SECS))
    }

    /// Location of the persisted subscription list.
    pub fn subscriptions_path(&self) -> PathBuf {
        self.saves_dir.join("subscriptions")
    }
}
