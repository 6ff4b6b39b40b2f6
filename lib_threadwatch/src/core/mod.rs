//! # Core Module
//!
//! Shared state and fan-out between the pollers and the outside world.
//!
//! ## Core Components:
//!
//! - **`registry`**: the `SubscriptionRegistry`, mapping each watched thread
//!   to its subscribers behind a reader/writer lock and guaranteeing that at
//!   most one poller runs per thread. Optionally mirrored to a plain-text file.
//!
//! - **`dispatcher`**: the Delivery Sink (a bounded channel every poller
//!   writes to) and the single `Dispatcher` task that resolves subscribers and
//!   hands each message to a `Notifier`.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Watched threads, their subscribers and poller ownership.
pub mod registry;
/// Delivery Sink channel and subscriber fan-out.
pub mod dispatcher;

// --- Public API Re-exports ---
pub use registry::{AddOutcome, SubscriberId, SubscriptionRegistry};
pub use dispatcher::{delivery_channel, DeliverySink, Dispatcher, NewMessage, Notifier};
