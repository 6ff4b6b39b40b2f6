//! # Forum Session Client
//!
//! One authenticated, cookie-backed HTTP session shared by every poller in
//! the process. Pollers only see the [`RemoteSource`] trait, so tests can hand
//! them an in-memory forum instead.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

use crate::configs::ForumConfig;
use crate::error::{Result, WatchError};
use crate::forum::page;

/// Raw access to the remote forum.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Establishes the session. Safe to call repeatedly; only the first
    /// successful call does any work.
    async fn authenticate(&self) -> Result<()>;

    /// GET `url` and return the body of a 2xx response.
    async fn fetch(&self, url: &str) -> Result<String>;

    /// Same as [`RemoteSource::fetch`] but marked as an in-page XHR, which the
    /// incremental-check endpoint requires.
    async fn fetch_xhr(&self, url: &str) -> Result<String>;
}

/// A [`RemoteSource`] backed by `reqwest` with a cookie store.
pub struct ForumClient {
    /// Shared client; its cookie jar carries the session.
    inner: reqwest::Client,
    /// Origin of the forum, used to locate the login form.
    base_url: Url,
    config: ForumConfig,
    /// Set once the login (or the decision to stay anonymous) succeeded.
    session: OnceCell<()>,
}

impl ForumClient {
    /// Builds the client without touching the network.
    ///
    /// # Errors
    /// Fails when `config.base_url` is not an absolute URL or the TLS backend
    /// cannot be initialised.
    pub fn new(config: ForumConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| WatchError::InvalidAddress(format!("{}: {e}", config.base_url)))?;

        let inner = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            inner,
            base_url,
            config,
            session: OnceCell::new(),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.initialized()
    }

    fn login_url(&self) -> Result<String> {
        self.base_url
            .join("/login")
            .map(String::from)
            .map_err(|e| WatchError::InvalidAddress(format!("{}: {e}", self.base_url)))
    }

    /// Fetches the login form, posts the credentials with the form's token and
    /// checks the response for the signed-in marker.
    async fn login(&self) -> Result<()> {
        let login_url = self.login_url()?;
        let form = self.get(&login_url, None).await?;
        let token = page::login_token(&form, &login_url)?;

        let response = self
            .inner
            .post(&login_url)
            .form(&[
                ("name", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
                ("cookie", "1"),
                ("_token", token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(WatchError::AuthenticationFailed(format!(
                "login form answered HTTP {status}"
            )));
        }
        if !page::is_authenticated(&body, &self.config.auth_marker) {
            return Err(WatchError::AuthenticationFailed(format!(
                "signed-in marker {:?} missing after login as {}",
                self.config.auth_marker, self.config.username
            )));
        }

        info!(user = %self.config.username, "logged in to {}", self.base_url);
        Ok(())
    }

    async fn get(&self, url: &str, headers: Option<HeaderMap>) -> Result<String> {
        let mut request = self.inner.get(url);
        if let Some(h) = headers {
            request = request.headers(h);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WatchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        debug!(%url, status = status.as_u16(), "fetched");
        Ok(response.text().await?)
    }
}

#[async_trait]
impl RemoteSource for ForumClient {
    async fn authenticate(&self) -> Result<()> {
        self.session
            .get_or_try_init(|| async {
                if self.config.is_anonymous() {
                    warn!("no forum credentials configured, continuing without a session");
                    return Ok(());
                }
                self.login().await
            })
            .await
            .map(|_| ())
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        self.get(url, None).await
    }

    async fn fetch_xhr(&self, url: &str) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        self.get(url, Some(headers)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_base_url() {
        let config = ForumConfig {
            base_url: "www.mediavida.com".into(),
            ..ForumConfig::default()
        };
        assert!(matches!(ForumClient::new(config), Err(WatchError::InvalidAddress(_))));
    }

    #[test]
    fn login_url_is_on_the_forum_origin() {
        let client = ForumClient::new(ForumConfig::default()).unwrap();
        assert_eq!(client.login_url().unwrap(), "https://www.mediavida.com/login");
    }

    #[tokio::test]
    async fn anonymous_session_needs_no_network() {
        let client = ForumClient::new(ForumConfig::default()).unwrap();
        assert!(!client.is_authenticated());
        client.authenticate().await.unwrap();
        client.authenticate().await.unwrap();
        assert!(client.is_authenticated());
    }
}
