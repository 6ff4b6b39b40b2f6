//! # Telegram Bot API Client
//!
//! The handful of Bot API methods the front end needs, called over plain
//! `reqwest` with JSON bodies, plus the `Notifier` that turns new forum posts
//! into chat messages.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use lib_threadwatch::core::{NewMessage, Notifier, SubscriberId};
use lib_threadwatch::WatchError;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Public Bot API endpoint.
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";
/// Longest text `sendMessage` accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    #[serde(default)]
    pub username: Option<String>,
}

pub struct TelegramApi {
    client: reqwest::Client,
    /// `<api>/bot<token>`; never logged.
    endpoint: String,
}

impl TelegramApi {
    pub fn new(api_url: &str, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build the Telegram HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: &Value, timeout: Option<Duration>) -> Result<T> {
        let mut request = self.client.post(format!("{}/{method}", self.endpoint)).json(params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // The token is part of the URL, so keep it out of error messages.
        let response = request
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("{method} request failed"))?;
        let status = response.status();
        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("{method} answered HTTP {status} with an unreadable body"))?;

        match body {
            ApiResponse { ok: true, result: Some(result), .. } => Ok(result),
            ApiResponse { description, .. } => bail!(
                "{method} failed (HTTP {status}): {}",
                description.unwrap_or_else(|| "no description".to_string())
            ),
        }
    }

    pub async fn get_me(&self) -> Result<BotUser> {
        self.call("getMe", &json!({}), None).await
    }

    /// Long-polls for updates after `offset`, waiting up to `timeout_secs`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let params = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        self.call("getUpdates", &params, Some(Duration::from_secs(timeout_secs + 1)))
            .await
    }

    /// Skips everything queued while the bot was offline and returns the
    /// offset to poll from.
    pub async fn drop_pending_updates(&self) -> Result<i64> {
        let last = self.get_updates(-1, 0).await?;
        Ok(last.last().map_or(0, |update| update.update_id + 1))
    }

    /// Sends `text` (HTML parse mode) to `chat_id`. Text beyond
    /// [`MAX_MESSAGE_CHARS`] is cut off.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let params = json!({
            "chat_id": chat_id,
            "text": truncate_chars(text, MAX_MESSAGE_CHARS),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        let _: Value = self.call("sendMessage", &params, None).await?;
        Ok(())
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        push_escaped(&mut out, c);
    }
    out
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        _ => out.push(c),
    }
}

fn escaped_len(c: char) -> usize {
    match c {
        '&' => 5,
        '<' | '>' => 4,
        '"' => 6,
        _ => 1,
    }
}

/// Escapes `text` so the result is at most `max_chars` characters, cutting
/// between source characters (never inside an entity) and marking the cut
/// with an ellipsis.
pub fn escape_html_truncated(text: &str, max_chars: usize) -> String {
    let full: usize = text.chars().map(escaped_len).sum();
    if full <= max_chars {
        return escape_html(text);
    }

    let budget = max_chars.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let len = escaped_len(c);
        if used + len > budget {
            break;
        }
        push_escaped(&mut out, c);
        used += len;
    }
    if max_chars > 0 {
        out.push('…');
    }
    out
}

pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Chat message for a new forum post: thread address, blank line, bold
/// author, then the body.
pub fn format_new_message(event: &NewMessage) -> String {
    let header = format!(
        "{}\n\n<b>{}</b>:\n",
        escape_html(event.address.as_str()),
        escape_html(&event.message.author)
    );
    let budget = MAX_MESSAGE_CHARS.saturating_sub(header.chars().count());
    let body = escape_html_truncated(event.message.body.trim(), budget);
    format!("{header}{body}")
}

/// Delivers new posts as Telegram messages; subscriber ids are chat ids.
pub struct TelegramNotifier {
    api: Arc<TelegramApi>,
}

impl TelegramNotifier {
    pub fn new(api: Arc<TelegramApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, subscriber: SubscriberId, event: &NewMessage) -> lib_threadwatch::Result<()> {
        self.api
            .send_message(subscriber, &format_new_message(event))
            .await
            .map_err(|e| WatchError::Delivery(format!("chat {subscriber}: {e:#}")))
    }
}
