//! # Test Support
//!
//! `FakeForum`, an in-memory [`RemoteSource`] that renders one thread the way
//! the real forum does: hidden `fid`/`tid`/`pagina`/`token` fields, post
//! elements carrying `data-num`/`data-autor`, last-page answers for requests
//! past the end and an XHR-only incremental-check endpoint.
//!
//! Compiled for this crate's own tests and, behind the `test-support`
//! feature, for the integration tests in `project_tests`.

use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use crate::error::{Result, WatchError};
use crate::forum::{ThreadAddress, FORUM_SECTION};
use crate::retrieve::RemoteSource;

#[derive(Debug, Clone)]
struct FakePost {
    /// `None` renders a post whose `data-num` is not a number.
    sequence: Option<u64>,
    author: String,
    body: String,
}

#[derive(Debug, Default)]
struct State {
    posts: Vec<FakePost>,
    next_sequence: u64,
    tokens_issued: u64,
    fetched: Vec<String>,
    auth_calls: usize,
    reject_logins: bool,
    /// Successful fetches left before the next one fails.
    fail_after: Option<usize>,
}

impl State {
    fn token(&self) -> String {
        format!("tok{}", self.tokens_issued)
    }
}

/// One fake thread served from memory.
pub struct FakeForum {
    address: ThreadAddress,
    thread_id: String,
    page_size: usize,
    state: Mutex<State>,
}

impl FakeForum {
    /// A thread at `address` with five posts per page.
    pub fn new(address: &str) -> Self {
        Self::with_page_size(address, 5)
    }

    pub fn with_page_size(address: &str, page_size: usize) -> Self {
        let address = ThreadAddress::parse(address).expect("fake forum address must be a thread");
        let thread_id = address
            .as_str()
            .rsplit('-')
            .next()
            .filter(|id| id.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or("1")
            .to_string();
        Self {
            address,
            thread_id,
            page_size: page_size.max(1),
            state: Mutex::new(State {
                next_sequence: 1,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake forum state poisoned")
    }

    pub fn address(&self) -> &ThreadAddress {
        &self.address
    }

    /// Appends a post and returns its sequence number.
    pub fn push_post(&self, author: &str, body: &str) -> u64 {
        let mut state = self.state();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.posts.push(FakePost {
            sequence: Some(sequence),
            author: author.to_string(),
            body: body.to_string(),
        });
        sequence
    }

    /// Appends `count` posts authored by `User<n>` with body `message <n>`.
    pub fn push_posts(&self, count: usize) -> Vec<u64> {
        (0..count)
            .map(|_| {
                let next = self.state().next_sequence;
                self.push_post(&format!("User{next}"), &format!("message {next}"))
            })
            .collect()
    }

    /// Appends a post without a usable sequence number.
    pub fn push_malformed_post(&self) {
        self.state().posts.push(FakePost {
            sequence: None,
            author: "Broken".to_string(),
            body: "unnumbered".to_string(),
        });
    }

    /// Drops every post numbered `sequence` or above.
    pub fn truncate_from(&self, sequence: u64) {
        self.state()
            .posts
            .retain(|post| post.sequence.is_none_or(|s| s < sequence));
    }

    /// Lets `successes` more fetches through, then fails exactly one.
    pub fn fail_after(&self, successes: usize) {
        self.state().fail_after = Some(successes);
    }

    pub fn reject_logins(&self, reject: bool) {
        self.state().reject_logins = reject;
    }

    /// Every URL fetched so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.state().fetched.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.state().fetched.len()
    }

    pub fn auth_calls(&self) -> usize {
        self.state().auth_calls
    }

    pub fn last_page(&self) -> u32 {
        let posts = self.state().posts.len();
        posts.div_ceil(self.page_size).max(1) as u32
    }

    fn record(&self, url: &str) -> Result<()> {
        let mut state = self.state();
        state.fetched.push(url.to_string());
        match state.fail_after {
            Some(0) => {
                state.fail_after = None;
                Err(WatchError::Status {
                    url: url.to_string(),
                    status: 503,
                })
            }
            Some(n) => {
                state.fail_after = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn render_page(&self, requested: u32) -> String {
        let page = requested.clamp(1, self.last_page());
        let mut state = self.state();
        state.tokens_issued += 1;

        let mut html = format!(
            concat!(
                "<!DOCTYPE html><html><head><title>thread</title></head><body>\n",
                "<form id=\"moar\"><input type=\"hidden\" id=\"fid\" value=\"27\">",
                "<input type=\"hidden\" id=\"tid\" value=\"{tid}\">",
                "<input type=\"hidden\" id=\"pagina\" value=\"{page}\">",
                "<input type=\"hidden\" id=\"token\" value=\"{token}\"></form>\n",
            ),
            tid = self.thread_id,
            page = page,
            token = state.token(),
        );

        let start = (page as usize - 1) * self.page_size;
        for post in state.posts.iter().skip(start).take(self.page_size) {
            let num = post.sequence.map_or_else(|| "n/a".to_string(), |s| s.to_string());
            html.push_str(&format!(
                concat!(
                    "<div class=\"cf post\" id=\"post-{num}\" data-num=\"{num}\" data-autor=\"{author}\">\n",
                    "  <div class=\"post-meta\"><a class=\"autor\" href=\"/id/{author}\">{author}</a></div>\n",
                    "  <div class=\"post-contents\"><p>{body}</p></div>\n",
                    "</div>\n",
                ),
                num = num,
                author = escape(&post.author),
                body = escape(&post.body),
            ));
        }
        html.push_str("</body></html>\n");
        html
    }

    fn render_moar(&self, url: &Url) -> String {
        let query = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default()
        };
        let state = self.state();
        if query("token") != state.token() || query("tid") != self.thread_id {
            return r#"{"error":"invalid token"}"#.to_string();
        }
        let last: u64 = query("last").parse().unwrap_or(0);
        let more = state.posts.iter().any(|p| p.sequence.is_some_and(|s| s > last));
        format!(r#"{{"moar":{}}}"#, u8::from(more))
    }

    fn route(&self, raw: &str, xhr: bool) -> Result<String> {
        self.record(raw)?;
        let not_found = || WatchError::Status {
            url: raw.to_string(),
            status: 404,
        };

        let url = Url::parse(raw).map_err(|_| not_found())?;
        if url.path() == format!("/{FORUM_SECTION}/moar.php") {
            if !xhr {
                return Ok("<html><body>Not allowed</body></html>".to_string());
            }
            return Ok(self.render_moar(&url));
        }

        let rest = raw
            .strip_prefix(self.address.as_str())
            .ok_or_else(not_found)?
            .trim_start_matches('/');
        let requested = if rest.is_empty() {
            1
        } else {
            rest.parse().map_err(|_| not_found())?
        };
        Ok(self.render_page(requested))
    }
}

#[async_trait]
impl RemoteSource for FakeForum {
    async fn authenticate(&self) -> Result<()> {
        let mut state = self.state();
        state.auth_calls += 1;
        if state.reject_logins {
            return Err(WatchError::AuthenticationFailed("fake forum rejects logins".to_string()));
        }
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        self.route(url, false)
    }

    async fn fetch_xhr(&self, url: &str) -> Result<String> {
        self.route(url, true)
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
