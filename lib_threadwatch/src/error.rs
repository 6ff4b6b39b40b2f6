//! # Error Types
//!
//! Every fallible operation in the crate returns [`WatchError`]. The variants
//! are grouped by how a thread poller reacts to them:
//!
//! - **Transient** (`Http`, `Status`, `MissingField`, `InvalidNumber`, `Json`):
//!   the current sweep is abandoned and retried on the next interval.
//! - **Per-message** (`MalformedPost`): the single post is skipped.
//! - **Startup** (`AuthenticationFailed`): no new poller is started.
//! - **Input / state** (`InvalidAddress`, `CorruptCursor`, `Io`).
//! - **Fan-out** (`Delivery`): a notifier could not reach a subscriber.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("field `{field}` not found in response from {url}")]
    MissingField { field: &'static str, url: String },

    #[error("field `{field}` is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("post element without a usable sequence number: {raw:?}")]
    MalformedPost { raw: String },

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("invalid thread address: {0}")]
    InvalidAddress(String),

    #[error("corrupt cursor file {}: {reason}", path.display())]
    CorruptCursor { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl WatchError {
    /// Errors after which a poller simply waits for the next interval.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WatchError::Http(_)
                | WatchError::Status { .. }
                | WatchError::MissingField { .. }
                | WatchError::InvalidNumber { .. }
                | WatchError::Json(_)
        )
    }
}
