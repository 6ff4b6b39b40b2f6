//! # Ingestors Module
//!
//! The polling engine proper.
//!
//! ## Contained Modules:
//! - **`thread_poller`**: the per-thread state machine. Resolves thread
//!   metadata, runs the incremental check, paginates for new posts, forwards
//!   the newest ones to the Delivery Sink and persists its cursor, then sleeps
//!   and retires once nobody watches the thread.
//! - **`watch_service`**: starts pollers for persisted and new subscriptions,
//!   at most one per thread, after the shared session is authenticated.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Per-thread polling loop.
pub mod thread_poller;
/// Poller supervision for front ends.
pub mod watch_service;

pub use thread_poller::{SweepReport, ThreadPoller};
pub use watch_service::WatchService;
