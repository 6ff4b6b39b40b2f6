//! # Thread Addresses
//!
//! A watched thread is identified by its canonical address: scheme, host and
//! exactly three path segments (`/foro/<subforum>/<thread-slug>`). Page
//! numbers, sub-paths, query strings and fragments are dropped, so every
//! link into the same thread maps onto one key.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{Result, WatchError};

/// First path segment of every forum thread.
pub const FORUM_SECTION: &str = "foro";

/// Number of path segments kept in a canonical address.
const THREAD_DEPTH: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadAddress {
    canonical: String,
    url: Url,
}

impl ThreadAddress {
    /// Validates `raw` and reduces it to its canonical form.
    ///
    /// # Errors
    /// Returns [`WatchError::InvalidAddress`] when the input is not an
    /// absolute http(s) URL under `/foro/` with at least three segments.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let url = Url::parse(raw).map_err(|e| WatchError::InvalidAddress(format!("{raw}: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(WatchError::InvalidAddress(format!("{raw}: unsupported scheme")));
        }
        let host = url
            .host_str()
            .ok_or_else(|| WatchError::InvalidAddress(format!("{raw}: missing host")))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        if segments.len() < THREAD_DEPTH {
            return Err(WatchError::InvalidAddress(format!(
                "{raw}: expected /{FORUM_SECTION}/<subforum>/<thread>"
            )));
        }
        if segments[0] != FORUM_SECTION {
            return Err(WatchError::InvalidAddress(format!(
                "{raw}: not a /{FORUM_SECTION}/ thread"
            )));
        }

        let mut canonical = format!("{}://{}", url.scheme(), host);
        if let Some(port) = url.port() {
            canonical.push_str(&format!(":{port}"));
        }
        for segment in &segments[..THREAD_DEPTH] {
            canonical.push('/');
            canonical.push_str(segment);
        }

        let url = Url::parse(&canonical).map_err(|e| WatchError::InvalidAddress(format!("{raw}: {e}")))?;
        Ok(Self { canonical, url })
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// `true` when the address lives on the same origin as `base_url`.
    pub fn is_on(&self, base_url: &str) -> bool {
        Url::parse(base_url)
            .map(|base| base.origin() == self.url.origin())
            .unwrap_or(false)
    }

    /// Address of page `page` of the thread.
    pub fn page_url(&self, page: u32) -> String {
        format!("{}/{}", self.canonical, page)
    }

    /// Address of the incremental "are there more messages" endpoint.
    pub fn moar_url(&self, token: &str, thread_id: &str, last_seq: u64) -> String {
        let mut url = self.url.clone();
        url.set_path(&format!("/{FORUM_SECTION}/moar.php"));
        url.query_pairs_mut()
            .append_pair("token", token)
            .append_pair("tid", thread_id)
            .append_pair("last", &last_seq.to_string());
        url.into()
    }
}

impl fmt::Display for ThreadAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for ThreadAddress {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for ThreadAddress {
    fn as_ref(&self) -> &str {
        &self.canonical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREAD: &str = "https://www.mediavida.com/foro/mafia/fortaleza-frontera-iv-remake-710835";

    #[test]
    fn canonical_address_is_a_fixed_point() {
        let once = ThreadAddress::parse(THREAD).unwrap();
        let twice = ThreadAddress::parse(once.as_str()).unwrap();
        assert_eq!(once.as_str(), THREAD);
        assert_eq!(once, twice);
    }

    #[test]
    fn page_suffix_fragment_and_query_are_dropped() {
        for variant in [
            format!("{THREAD}/123"),
            format!("{THREAD}/"),
            format!("{THREAD}#post-42"),
            format!("{THREAD}/7?foo=bar#x"),
            format!("  {THREAD}/2/extra  "),
        ] {
            assert_eq!(ThreadAddress::parse(&variant).unwrap().as_str(), THREAD, "{variant}");
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in [
            "not a url",
            "ftp://www.mediavida.com/foro/mafia/thread-1",
            "https://www.mediavida.com/foro/mafia",
            "https://www.mediavida.com/noticias/mafia/thread-1",
        ] {
            assert!(
                matches!(ThreadAddress::parse(bad), Err(WatchError::InvalidAddress(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn origin_check_compares_scheme_and_host() {
        let address = ThreadAddress::parse(THREAD).unwrap();
        assert!(address.is_on("https://www.mediavida.com"));
        assert!(address.is_on("https://www.mediavida.com/foro"));
        assert!(!address.is_on("http://www.mediavida.com"));
        assert!(!address.is_on("https://example.com"));
    }

    #[test]
    fn builds_page_and_moar_urls() {
        let address = ThreadAddress::parse(THREAD).unwrap();
        assert_eq!(address.page_url(4), format!("{THREAD}/4"));
        assert_eq!(
            address.moar_url("a b", "710835", 57),
            "https://www.mediavida.com/foro/moar.php?token=a+b&tid=710835&last=57"
        );
    }
}
