//! MusicBrainz release search by tag and date range.
//!
//! One request per tag, no pagination. MusicBrainz answers 503 when a client
//! exceeds its rate limit; that status is re-issued after a fixed wait rather
//! than retried with backoff.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{IdentityKind, PageCursor, RateLimitRule, SourceAdapter, SourceError, join_base};
use crate::fetch::RequestSpec;
use crate::model::{RawCandidate, SourceId};

const DEFAULT_BASE_URL: &str = "https://musicbrainz.org";
const SEARCH_PATH: &str = "/ws/2/release";
const RELEASE_PAGE_URL: &str = "https://musicbrainz.org/release/";
const SEARCH_LIMIT: u32 = 100;

/// Status MusicBrainz uses to signal rate limiting.
pub const RATE_LIMITED_STATUS: u16 = 503;
/// Default wait before re-issuing a rate-limited request.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);
/// Default number of re-issues after a rate-limited response.
pub const DEFAULT_MAX_REISSUES: u32 = 2;

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub(crate) releases: Vec<SearchRelease>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchRelease {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) title: String,
    pub(crate) date: Option<String>,
    #[serde(rename = "artist-credit", default)]
    pub(crate) artist_credit: Vec<ArtistCredit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArtistCredit {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) joinphrase: String,
}

impl SearchRelease {
    /// Artist credit as displayed by MusicBrainz (`A & B`).
    pub(crate) fn artist_name(&self) -> String {
        self.artist_credit
            .iter()
            .map(|credit| format!("{}{}", credit.name, credit.joinphrase))
            .collect::<String>()
            .trim()
            .to_string()
    }
}

/// Adapter for the MusicBrainz release search API.
#[derive(Debug, Clone)]
pub struct MusicBrainzTagAdapter {
    base_url: String,
    rate_limit_wait: Duration,
}

impl Default for MusicBrainzTagAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MusicBrainzTagAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limit_wait: DEFAULT_RATE_LIMIT_WAIT,
        }
    }

    /// Overrides the wait applied after a rate-limited response.
    #[must_use]
    pub fn with_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.rate_limit_wait = wait;
        self
    }
}

impl SourceAdapter for MusicBrainzTagAdapter {
    fn source(&self) -> SourceId {
        SourceId::Musicbrainz
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn identity(&self) -> IdentityKind {
        IdentityKind::Application
    }

    fn rate_limit_rule(&self) -> Option<RateLimitRule> {
        Some(RateLimitRule {
            status: RATE_LIMITED_STATUS,
            wait: self.rate_limit_wait,
            max_reissues: DEFAULT_MAX_REISSUES,
        })
    }

    fn sweeps_genres(&self) -> bool {
        true
    }

    fn default_genres(&self) -> Vec<String> {
        vec!["metal".to_string()]
    }

    fn request(&self, cursor: &PageCursor<'_>) -> Result<RequestSpec, SourceError> {
        let tag = cursor.genre.ok_or(SourceError::MissingGenre {
            origin: self.source(),
        })?;
        let query = format!(
            "tag:\"{}\" AND date:[{} TO {}]",
            tag.replace('"', ""),
            cursor.window.start(),
            cursor.window.end()
        );
        Ok(RequestSpec::new(join_base(&self.base_url, SEARCH_PATH))
            .with_query("query", query)
            .with_query("fmt", "json")
            .with_query("limit", SEARCH_LIMIT.to_string())
            .without_retry_on(RATE_LIMITED_STATUS))
    }

    fn extract(
        &self,
        body: &str,
        cursor: &PageCursor<'_>,
    ) -> Result<Vec<RawCandidate>, SourceError> {
        let response: SearchResponse = serde_json::from_str(body)
            .map_err(|e| SourceError::malformed(self.source(), e, body))?;
        debug!(releases = response.releases.len(), tag = ?cursor.genre, "MusicBrainz search results");

        Ok(response
            .releases
            .into_iter()
            .map(|release| {
                let artist = release.artist_name();
                let url = format!("{RELEASE_PAGE_URL}{}", release.id);
                let candidate = cursor
                    .candidate(self.source(), release.title, artist)
                    .with_url(url);
                match release.date {
                    Some(date) if !date.trim().is_empty() => candidate.with_date(date),
                    _ => candidate,
                }
            })
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::dates::DateWindow;

    fn window() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
    }

    #[test]
    fn test_request_builds_tag_and_date_query() {
        let window = window();
        let adapter = MusicBrainzTagAdapter::new();
        let request = adapter
            .request(&PageCursor::new(1, Some("doom metal"), &window))
            .unwrap();
        assert_eq!(request.no_retry_status(), Some(RATE_LIMITED_STATUS));
        let url = request.resolved_url().unwrap();
        assert_eq!(url.path(), SEARCH_PATH);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs[0],
            (
                "query".to_string(),
                "tag:\"doom metal\" AND date:[2024-01-01 TO 2024-03-31]".to_string()
            )
        );
        assert!(pairs.contains(&("fmt".into(), "json".into())));
        assert!(pairs.contains(&("limit".into(), "100".into())));
    }

    #[test]
    fn test_request_requires_genre() {
        let window = window();
        let error = MusicBrainzTagAdapter::new()
            .request(&PageCursor::new(1, None, &window))
            .unwrap_err();
        assert!(matches!(error, SourceError::MissingGenre { .. }));
    }

    #[test]
    fn test_rate_limit_rule_and_identity() {
        let adapter = MusicBrainzTagAdapter::new().with_rate_limit_wait(Duration::from_millis(10));
        let rule = adapter.rate_limit_rule().unwrap();
        assert_eq!(rule.status, 503);
        assert_eq!(rule.wait, Duration::from_millis(10));
        assert_eq!(rule.max_reissues, 2);
        assert_eq!(adapter.identity(), IdentityKind::Application);
    }

    #[test]
    fn test_extract_releases() {
        let window = window();
        let body = r#"{
            "count": 2,
            "releases": [
                {"id": "abc-123", "title": "Album Y", "date": "2024-03-15",
                 "artist-credit": [{"name": "Artist X", "joinphrase": " & "}, {"name": "Guest"}]},
                {"id": "def-456", "title": "No Date"}
            ]
        }"#;
        let candidates = MusicBrainzTagAdapter::new()
            .extract(body, &PageCursor::new(1, Some("sludge"), &window))
            .unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].raw_artist, "Artist X & Guest");
        assert_eq!(candidates[0].raw_title, "Album Y");
        assert_eq!(candidates[0].raw_date_text.as_deref(), Some("2024-03-15"));
        assert_eq!(candidates[0].genre_tag.as_deref(), Some("sludge"));
        assert_eq!(
            candidates[0].url.as_deref(),
            Some("https://musicbrainz.org/release/abc-123")
        );
        assert!(candidates[1].raw_date_text.is_none());
        assert!(candidates[1].raw_artist.is_empty());
    }

    #[test]
    fn test_extract_rejects_invalid_json() {
        let window = window();
        let error = MusicBrainzTagAdapter::new()
            .extract("not json", &PageCursor::new(1, Some("metal"), &window))
            .unwrap_err();
        assert!(matches!(error, SourceError::MalformedResponse { .. }));
    }
}
