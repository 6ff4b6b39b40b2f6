//! # Configuration Modules
//!
//! Settings structs for the forum session and for thread polling.

/// Forum session and polling settings.
pub mod config_watch;

pub use config_watch::{ForumConfig, WatchConfig, DEFAULT_FORUM_URL, MIN_INTERVAL_SECS};
