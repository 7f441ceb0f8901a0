//! HTTP client wrapper shared by the politeness gate, fetcher and enricher.
//!
//! The identity (User-Agent) is not baked into the client: it is supplied per
//! request so a challenged fetch can be repeated under the fallback identity
//! without rebuilding connection pools.

use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use tracing::instrument;

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout (20 seconds).
pub const READ_TIMEOUT_SECS: u64 = 20;

const BROWSER_ACCEPT: &str = "application/json, text/html, */*";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const BROWSER_REFERER: &str = "https://www.google.com/";

/// HTTP client with connection pooling, gzip and a cookie store.
///
/// Created once per run and passed by reference to every component.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with default timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    #[instrument(level = "debug")]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .cookie_store(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Returns the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Starts a GET with the given identity and browser-like headers.
    pub fn browser_get(&self, url: &str, identity: &str) -> RequestBuilder {
        self.client.get(url).headers(browser_headers(identity))
    }
}

/// Builds the header set sent with every listing/API request.
#[must_use]
pub fn browser_headers(identity: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(identity) {
        headers.insert(USER_AGENT, value);
    }
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE),
    );
    headers.insert(REFERER, HeaderValue::from_static(BROWSER_REFERER));
    headers
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_headers_carry_identity() {
        let headers = browser_headers("Mozilla/5.0 test");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "Mozilla/5.0 test");
        assert_eq!(headers.get(ACCEPT_LANGUAGE).unwrap(), BROWSER_ACCEPT_LANGUAGE);
        assert!(headers.contains_key(REFERER));
    }

    #[test]
    fn test_browser_headers_skip_invalid_identity() {
        let headers = browser_headers("bad\nvalue");
        assert!(headers.get(USER_AGENT).is_none());
        assert!(headers.contains_key(ACCEPT));
    }

    #[test]
    fn test_client_builds_with_custom_timeouts() {
        let client = HttpClient::new_with_timeouts(1, 2);
        let _ = client.inner();
    }
}
