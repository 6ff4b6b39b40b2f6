//! Values extracted from forum pages.

/// A single forum message. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub author: String,
    pub body: String,
}

/// A message together with the sequence number the forum assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub sequence: u64,
    pub message: Message,
}

/// Hidden form fields carried by every thread page.
///
/// The token changes on each page load and must be fresh when calling the
/// incremental-check endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadInfo {
    pub subforum_id: Option<String>,
    pub thread_id: String,
    pub page: Option<u32>,
    pub token: String,
}
