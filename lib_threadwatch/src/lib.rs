//! # lib_threadwatch
//!
//! Watches paginated forum threads for newly posted messages and forwards
//! them to subscribers. One poller task runs per watched thread; every poller
//! shares one authenticated session, one subscription registry and one
//! delivery channel.

// Declare the modules to re-export
pub mod configs;
pub mod core;
pub mod error;
pub mod forum;
pub mod ingestors;
#[cfg(feature = "loggers")]
pub mod loggers;
pub mod retrieve;
pub mod storage;
pub mod utils;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

// Re-export everything front ends need
pub use crate::configs::{ForumConfig, WatchConfig};
pub use crate::core::{delivery_channel, DeliverySink, Dispatcher, NewMessage, Notifier, SubscriberId, SubscriptionRegistry};
pub use crate::error::{Result, WatchError};
pub use crate::forum::{Message, ThreadAddress};
pub use crate::ingestors::{ThreadPoller, WatchService};
pub use crate::retrieve::{ForumClient, RemoteSource};
pub use crate::storage::{Cursor, CursorStore};
