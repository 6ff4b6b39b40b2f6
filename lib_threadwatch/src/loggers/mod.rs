//! # Loggers Module
//!
//! Process-wide `tracing` setup shared by the binaries: console output for
//! operators and daily JSON files for later inspection.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Subscriber bootstrap and log retention.
pub mod loggerlocal;

pub use loggerlocal::{cleanup_old_logs, setup_logging, LoggingOptions};
