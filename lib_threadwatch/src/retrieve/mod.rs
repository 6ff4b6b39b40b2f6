//! # Data Retrieval Module
//!
//! The network edge of the crate: a single cookie-backed session against the
//! forum, exposed to the rest of the system through the [`RemoteSource`]
//! trait.
//!
//! ## Contained Modules:
//!
//! - **`forum_client`**: `ForumClient`, a `reqwest`-based implementation
//!   that logs in once per process and then performs plain and XHR-style
//!   fetches on behalf of every poller.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Shared authenticated session and the `RemoteSource` seam.
pub mod forum_client;

pub use forum_client::{ForumClient, RemoteSource};
