//! Challenge-aware GET with bounded retries and a caller-level identity fallback.
//!
//! Each HTTP exchange is classified into an [`AttemptOutcome`] before any
//! retry decision is made. The retry loop lives in
//! [`ChallengeAwareFetcher::fetch`]; the single fallback to a second identity
//! lives in [`ChallengeAwareFetcher::fetch_with_fallback`] and only applies
//! when the primary identity ends in a challenge.

use reqwest::header::RETRY_AFTER;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::challenge::{body_snippet, is_challenge};
use super::client::HttpClient;
use super::error::FetchError;
use super::retry::{RetryDecision, RetryPolicy, classify_error};

/// A GET request: base URL, query parameters and retry exemptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    url: String,
    query: Vec<(String, String)>,
    no_retry_status: Option<u16>,
}

impl RequestSpec {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            no_retry_status: None,
        }
    }

    /// Appends a query parameter. Parameters are sent in insertion order.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Excludes `status` from the retry loop so the caller can handle it.
    #[must_use]
    pub fn without_retry_on(mut self, status: u16) -> Self {
        self.no_retry_status = Some(status);
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    #[must_use]
    pub fn no_retry_status(&self) -> Option<u16> {
        self.no_retry_status
    }

    /// Builds the full URL with encoded query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] when the base URL does not parse.
    pub fn resolved_url(&self) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.url).map_err(|_| FetchError::invalid_url(&self.url))?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Path plus query as matched against robots.txt rules.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] when the base URL does not parse.
    pub fn robots_path(&self) -> Result<String, FetchError> {
        let url = self.resolved_url()?;
        Ok(match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        })
    }
}

/// Result of a single HTTP exchange.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// 2xx response that is not a challenge page.
    Body(String),
    /// Anti-automation response.
    Challenged { status: u16, snippet: String },
    /// Any other failure.
    Failed(FetchError),
}

impl AttemptOutcome {
    fn into_result(self, url: &str) -> Result<String, FetchError> {
        match self {
            Self::Body(body) => Ok(body),
            Self::Challenged { status, snippet } => Err(FetchError::challenge(url, status, snippet)),
            Self::Failed(error) => Err(error),
        }
    }
}

/// Primary identity plus an optional fallback used once after a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPair {
    pub primary: String,
    pub fallback: Option<String>,
}

impl IdentityPair {
    #[must_use]
    pub fn new(primary: impl Into<String>, fallback: Option<String>) -> Self {
        Self {
            primary: primary.into(),
            fallback,
        }
    }

    /// A pair with no fallback identity.
    #[must_use]
    pub fn single(primary: impl Into<String>) -> Self {
        Self::new(primary, None)
    }
}

/// Fetches listing pages and API responses.
#[derive(Debug, Clone)]
pub struct ChallengeAwareFetcher {
    client: HttpClient,
    retry: RetryPolicy,
}

impl ChallengeAwareFetcher {
    #[must_use]
    pub fn new(client: HttpClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    #[must_use]
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Performs one GET and classifies the response.
    #[instrument(skip(self, identity), fields(url = %url))]
    pub async fn attempt(&self, url: &str, identity: &str) -> AttemptOutcome {
        let response = match self.client.browser_get(url, identity).send().await {
            Ok(response) => response,
            Err(error) => return AttemptOutcome::Failed(FetchError::network(url, error)),
        };

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = match response.text().await {
            Ok(body) => body,
            Err(error) => return AttemptOutcome::Failed(FetchError::body(url, error)),
        };

        if is_challenge(status, &body) {
            return AttemptOutcome::Challenged {
                status,
                snippet: body_snippet(&body),
            };
        }

        if !(200..300).contains(&status) {
            return AttemptOutcome::Failed(FetchError::http_status_with_retry_after(
                url,
                status,
                retry_after,
            ));
        }

        AttemptOutcome::Body(body)
    }

    /// Fetches `request` under `identity`, retrying transient failures and
    /// challenges with exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns the last [`FetchError`] once attempts are exhausted, the failure
    /// is permanent, or the status is exempted by the request.
    #[instrument(skip(self, request, identity), fields(url = %request.base_url()))]
    pub async fn fetch(&self, request: &RequestSpec, identity: &str) -> Result<String, FetchError> {
        let url = request.resolved_url()?.to_string();
        let mut attempt = 1;

        loop {
            let error = match self.attempt(&url, identity).await.into_result(&url) {
                Ok(body) => {
                    debug!(attempt, bytes = body.len(), "fetched");
                    return Ok(body);
                }
                Err(error) => error,
            };

            if request.no_retry_status.is_some() && error.status() == request.no_retry_status {
                debug!(status = ?error.status(), "status handled by caller; not retrying");
                return Err(error);
            }

            match self.retry.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    warn!(
                        attempt,
                        next_attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "fetch failed; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next_attempt;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(attempt, reason = %reason, "giving up");
                    return Err(error);
                }
            }
        }
    }

    /// Fetches with the primary identity, repeating the whole fetch once with
    /// the fallback identity when the primary ends in a challenge.
    ///
    /// # Errors
    ///
    /// Returns the primary identity's error when it is not a challenge or no
    /// fallback exists, otherwise the fallback identity's error.
    pub async fn fetch_with_fallback(
        &self,
        request: &RequestSpec,
        identities: &IdentityPair,
    ) -> Result<String, FetchError> {
        match self.fetch(request, &identities.primary).await {
            Err(error) if error.is_challenge() => {
                let Some(fallback) = identities.fallback.as_deref() else {
                    return Err(error);
                };
                info!(url = %request.base_url(), "primary identity challenged; retrying with fallback identity");
                self.fetch(request, fallback).await
            }
            result => result,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_url_encodes_query() {
        let request = RequestSpec::new("https://musicbrainz.org/ws/2/release")
            .with_query("query", "tag:\"doom metal\"")
            .with_query("fmt", "json");
        let url = request.resolved_url().unwrap();
        assert_eq!(url.path(), "/ws/2/release");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("query".to_string(), "tag:\"doom metal\"".to_string()),
                ("fmt".to_string(), "json".to_string()),
            ]
        );
    }

    #[test]
    fn test_resolved_url_keeps_existing_query() {
        let request = RequestSpec::new("https://metalstorm.net/events/new_releases.php?page=2")
            .with_query("genre", "7");
        let url = request.resolved_url().unwrap();
        assert_eq!(url.query(), Some("page=2&genre=7"));
    }

    #[test]
    fn test_resolved_url_rejects_garbage() {
        let error = RequestSpec::new("not a url").resolved_url().unwrap_err();
        assert!(matches!(error, FetchError::InvalidUrl { .. }));
    }

    #[test]
    fn test_robots_path_includes_query() {
        let request = RequestSpec::new("https://metalstorm.net/events/new_releases.php")
            .with_query("page", "1");
        assert_eq!(
            request.robots_path().unwrap(),
            "/events/new_releases.php?page=1"
        );
        let bare = RequestSpec::new("https://metalstorm.net/events/upcoming_releases.php");
        assert_eq!(bare.robots_path().unwrap(), "/events/upcoming_releases.php");
    }

    #[test]
    fn test_attempt_outcome_into_result() {
        let ok = AttemptOutcome::Body("hello".into()).into_result("https://a.test");
        assert_eq!(ok.unwrap(), "hello");

        let challenged = AttemptOutcome::Challenged {
            status: 200,
            snippet: "captcha".into(),
        }
        .into_result("https://a.test")
        .unwrap_err();
        assert!(challenged.is_challenge());
        assert_eq!(challenged.status(), Some(200));
    }

    #[test]
    fn test_identity_pair_single_has_no_fallback() {
        let pair = IdentityPair::single("agent");
        assert_eq!(pair.primary, "agent");
        assert!(pair.fallback.is_none());
    }
}
