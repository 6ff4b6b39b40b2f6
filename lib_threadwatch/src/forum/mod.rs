//! # Forum Module
//!
//! Everything that knows about the remote forum's shape: how thread
//! addresses look, which values a page carries and how to read them.
//!
//! ## Contained Modules:
//!
//! - **`address`**: validation and canonicalization of thread addresses.
//! - **`model`**: the plain values extracted from pages (`Message`, `Post`,
//!   `ThreadInfo`).
//! - **`page`**: HTML/JSON extraction for hidden fields, posts and the
//!   incremental-check flag.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Thread address validation and canonicalization.
pub mod address;
/// Values extracted from forum pages.
pub mod model;
/// HTML and JSON extraction.
pub mod page;

pub use address::{ThreadAddress, FORUM_SECTION};
pub use model::{Message, Post, ThreadInfo};
