//! # Utilities Module
//!
//! General-purpose helpers shared by the storage and registry layers.
//!
//! ## Contained Modules:
//!
//! - **`hashing`**: stable content hashes used to name per-thread state files.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Stable content hashing helpers.
pub mod hashing;

pub use hashing::content_hash;
