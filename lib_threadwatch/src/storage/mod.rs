//! # Storage Module
//!
//! On-disk state owned by the polling engine.
//!
//! ## Contained Modules:
//!
//! - **`cursor_store`**: one small file per watched thread recording how far
//!   it has been read, replaced atomically after every successful sweep.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Per-thread watermark persistence.
pub mod cursor_store;

pub use cursor_store::{Cursor, CursorStore};
