//! # Page Parsing
//!
//! Extracts the few things the poller needs from forum HTML and JSON:
//! hidden form fields (`fid`, `tid`, `pagina`, `token`, `_token`), post
//! elements and the incremental-check flag. The markup is stable and shallow
//! enough that tag-level regular expressions are sufficient; no DOM is built.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::error::{Result, WatchError};
use crate::forum::model::{Message, Post, ThreadInfo};

static START_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([a-zA-Z][a-zA-Z0-9]*)\b((?:[^>"']|"[^"]*"|'[^']*')*)>"#).unwrap()
});
static TAG_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(/?)([a-zA-Z][a-zA-Z0-9]*)\b(?:[^>"']|"[^"]*"|'[^']*')*>"#).unwrap()
});
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .unwrap()
});
static SCRIPT_OR_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>").unwrap());
static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p\s*>").unwrap());
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*)+").unwrap());
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);").unwrap());

/// A start tag located in a document.
struct Tag<'a> {
    name: &'a str,
    attrs: &'a str,
    start: usize,
    end: usize,
}

fn start_tags(html: &str) -> impl Iterator<Item = Tag<'_>> {
    START_TAG.captures_iter(html).filter_map(|caps| {
        let whole = caps.get(0)?;
        Some(Tag {
            name: caps.get(1)?.as_str(),
            attrs: caps.get(2).map_or("", |m| m.as_str()),
            start: whole.start(),
            end: whole.end(),
        })
    })
}

/// Value of attribute `name` in an attribute list, entity-decoded.
fn attribute(attrs: &str, name: &str) -> Option<String> {
    ATTRIBUTE.captures_iter(attrs).find_map(|caps| {
        if !caps[1].eq_ignore_ascii_case(name) {
            return None;
        }
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());
        Some(decode_entities(value))
    })
}

fn has_class(attrs: &str, class: &str) -> bool {
    attribute(attrs, "class").is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
}

/// Inner markup of the element opened by `open`, matched by tag depth.
fn inner_html<'a>(html: &'a str, open: &Tag<'_>) -> &'a str {
    let rest = &html[open.end..];
    let mut depth = 1usize;
    for caps in TAG_BOUNDARY.captures_iter(rest) {
        if !caps[2].eq_ignore_ascii_case(open.name) {
            continue;
        }
        let Some(whole) = caps.get(0) else { continue };
        if &caps[1] == "/" {
            depth -= 1;
            if depth == 0 {
                return &rest[..whole.start()];
            }
        } else if !whole.as_str().ends_with("/>") {
            depth += 1;
        }
    }
    rest
}

/// Decodes the named entities the forum emits plus numeric references.
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Visible text of an HTML fragment.
pub fn text_content(fragment: &str) -> String {
    let text = SCRIPT_OR_STYLE.replace_all(fragment, "");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text);
    BLANK_LINES.replace_all(text.trim(), "\n\n").into_owned()
}

/// Value of the element whose `id` is `id`, if present and non-empty.
pub fn hidden_field(html: &str, id: &str) -> Option<String> {
    start_tags(html)
        .find(|tag| attribute(tag.attrs, "id").as_deref() == Some(id))
        .and_then(|tag| attribute(tag.attrs, "value"))
        .filter(|value| !value.is_empty())
}

/// Anti-forgery token of the login form.
pub fn login_token(html: &str, url: &str) -> Result<String> {
    hidden_field(html, "_token").ok_or_else(|| WatchError::MissingField {
        field: "_token",
        url: url.to_string(),
    })
}

/// `true` when the page contains the marker only rendered for signed-in users.
pub fn is_authenticated(html: &str, marker: &str) -> bool {
    html.to_lowercase().contains(&marker.to_lowercase())
}

/// Reads the thread metadata from the first page of a thread.
pub fn parse_thread_info(html: &str, url: &str) -> Result<ThreadInfo> {
    let missing = |field| WatchError::MissingField { field, url: url.to_string() };
    Ok(ThreadInfo {
        subforum_id: hidden_field(html, "fid"),
        thread_id: hidden_field(html, "tid").ok_or_else(|| missing("tid"))?,
        page: hidden_field(html, "pagina").and_then(|p| p.trim().parse().ok()),
        token: hidden_field(html, "token").ok_or_else(|| missing("token"))?,
    })
}

/// The page number the forum says it rendered.
///
/// Requests past the last page are answered with the last page, so this can
/// differ from the page that was asked for.
pub fn parse_page_number(html: &str, url: &str) -> Result<u32> {
    let raw = hidden_field(html, "pagina").ok_or_else(|| WatchError::MissingField {
        field: "pagina",
        url: url.to_string(),
    })?;
    raw.trim()
        .parse()
        .map_err(|_| WatchError::InvalidNumber { field: "pagina", value: raw })
}

/// Posts in document order.
///
/// A post whose sequence number cannot be read is returned as
/// [`WatchError::MalformedPost`] so the caller can skip it and carry on.
pub fn parse_posts(html: &str) -> Vec<Result<Post>> {
    let posts: Vec<Tag<'_>> = start_tags(html)
        .filter(|tag| has_class(tag.attrs, "cf") && has_class(tag.attrs, "post"))
        .collect();

    posts
        .iter()
        .enumerate()
        .map(|(i, tag)| -> Result<Post> {
            let region_end = posts.get(i + 1).map_or(html.len(), |next| next.start);
            let region = &html[tag.end..region_end];

            let raw_num = attribute(tag.attrs, "data-num").unwrap_or_default();
            let sequence = raw_num
                .trim()
                .parse::<u64>()
                .map_err(|_| WatchError::MalformedPost { raw: raw_num.clone() })?;

            let author = attribute(tag.attrs, "data-autor").unwrap_or_default().to_lowercase();
            let body = start_tags(region)
                .find(|inner| has_class(inner.attrs, "post-contents"))
                .map(|inner| text_content(inner_html(region, &inner)))
                .unwrap_or_default();

            Ok(Post { sequence, message: Message { author, body } })
        })
        .collect()
}

/// Reads the incremental-check response.
///
/// The flag is numeric on the wire but booleans and numeric strings are
/// accepted as well; anything non-zero means new content is available.
pub fn parse_moar(body: &str, url: &str) -> Result<bool> {
    let value: Value = serde_json::from_str(body)?;
    let flag = value.get("moar").ok_or_else(|| WatchError::MissingField {
        field: "moar",
        url: url.to_string(),
    })?;
    let invalid = || WatchError::InvalidNumber { field: "moar", value: flag.to_string() };
    match flag {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).ok_or_else(invalid),
        Value::String(s) => s.trim().parse::<f64>().map(|f| f != 0.0).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}
