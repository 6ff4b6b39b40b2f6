//! Telegram front end of the thread watcher.

/// Telegram update loop.
pub mod bot;
/// Chat command parsing and handling.
pub mod commands;
/// Layered configuration: defaults, config file, environment and CLI.
pub mod config;
/// Bot API client and the Telegram `Notifier`.
pub mod telegram;
