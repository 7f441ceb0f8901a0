//! Best-effort MusicBrainz lookup for merged releases.
//!
//! A lookup that fails for any reason leaves the release unenriched; the
//! failure is only logged at debug level.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::fetch::{ChallengeAwareFetcher, FetchError, HttpClient, RequestSpec, RetryPolicy};
use crate::model::{CanonicalRelease, Enrichment};
use crate::sources::musicbrainz::SearchResponse;

/// Default MusicBrainz web service root.
pub const DEFAULT_ENRICHMENT_BASE_URL: &str = "https://musicbrainz.org";

/// Default pause before each lookup.
pub const DEFAULT_ENRICHMENT_DELAY: Duration = Duration::from_millis(1000);

/// Errors from a single enrichment lookup.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("lookup request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("lookup response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Looks up corroborating data for one release.
#[async_trait]
pub trait ReleaseEnricher: Send + Sync {
    /// Returns the best match, or `None` when the service knows no release.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError`] when the lookup cannot be completed.
    async fn lookup(&self, artist: &str, title: &str) -> Result<Option<Enrichment>, EnrichError>;
}

/// MusicBrainz release search limited to the best hit.
#[derive(Debug, Clone)]
pub struct MusicBrainzEnricher {
    fetcher: ChallengeAwareFetcher,
    base_url: String,
    identity: String,
}

impl MusicBrainzEnricher {
    /// Creates an enricher that identifies as `identity`. Lookups are single
    /// attempts.
    #[must_use]
    pub fn new(client: HttpClient, base_url: &str, identity: impl Into<String>) -> Self {
        Self {
            fetcher: ChallengeAwareFetcher::new(client, RetryPolicy::with_max_attempts(1)),
            base_url: base_url.trim_end_matches('/').to_string(),
            identity: identity.into(),
        }
    }

    fn request(&self, artist: &str, title: &str) -> RequestSpec {
        let query = format!(
            "artist:\"{}\" AND release:\"{}\"",
            strip_quotes(artist),
            strip_quotes(title)
        );
        RequestSpec::new(format!("{}/ws/2/release", self.base_url))
            .with_query("query", query)
            .with_query("fmt", "json")
            .with_query("limit", "1")
    }
}

#[async_trait]
impl ReleaseEnricher for MusicBrainzEnricher {
    #[instrument(skip(self))]
    async fn lookup(&self, artist: &str, title: &str) -> Result<Option<Enrichment>, EnrichError> {
        let body = self
            .fetcher
            .fetch(&self.request(artist, title), &self.identity)
            .await?;
        let response: SearchResponse = serde_json::from_str(&body)?;
        Ok(response.releases.into_iter().next().map(|release| Enrichment {
            musicbrainz_id: release.id,
            date: release.date.filter(|d| !d.trim().is_empty()),
        }))
    }
}

/// Enriches every release in order, pausing `delay` before each lookup.
///
/// Returns how many releases gained enrichment.
pub async fn enrich_releases(
    enricher: &dyn ReleaseEnricher,
    releases: &mut [CanonicalRelease],
    delay: Duration,
) -> usize {
    let mut enriched = 0;
    for release in releases.iter_mut() {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match enricher.lookup(&release.artist, &release.title).await {
            Ok(Some(enrichment)) => {
                release.enrichment = Some(enrichment);
                enriched += 1;
            }
            Ok(None) => {
                debug!(artist = %release.artist, title = %release.title, "no MusicBrainz match");
            }
            Err(error) => {
                debug!(
                    artist = %release.artist,
                    title = %release.title,
                    error = %error,
                    "MusicBrainz lookup failed"
                );
            }
        }
    }
    enriched
}

fn strip_quotes(value: &str) -> String {
    value.replace('"', "")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::model::SourceId;

    #[derive(Default)]
    struct ScriptedEnricher {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReleaseEnricher for ScriptedEnricher {
        async fn lookup(
            &self,
            artist: &str,
            title: &str,
        ) -> Result<Option<Enrichment>, EnrichError> {
            self.calls.lock().unwrap().push(format!("{artist}/{title}"));
            match title {
                "Known" => Ok(Some(Enrichment {
                    musicbrainz_id: "mbid-1".into(),
                    date: Some("2024-03".into()),
                })),
                "Broken" => Err(EnrichError::Decode(
                    serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
                )),
                _ => Ok(None),
            }
        }
    }

    fn release(title: &str) -> CanonicalRelease {
        CanonicalRelease {
            artist: "Oak".into(),
            title: title.into(),
            release_date: None,
            genres: Vec::new(),
            url: None,
            source_of_record: SourceId::MetalArchives,
            enrichment: None,
        }
    }

    #[tokio::test]
    async fn test_enrich_releases_swallows_failures() {
        let enricher = ScriptedEnricher::default();
        let mut releases = vec![release("Known"), release("Broken"), release("Unknown")];

        let count = enrich_releases(&enricher, &mut releases, Duration::ZERO).await;

        assert_eq!(count, 1);
        assert_eq!(
            releases[0].enrichment.as_ref().unwrap().musicbrainz_id,
            "mbid-1"
        );
        assert!(releases[1].enrichment.is_none());
        assert!(releases[2].enrichment.is_none());
        assert_eq!(enricher.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_enrich_releases_waits_between_lookups() {
        tokio::time::pause();
        let enricher = ScriptedEnricher::default();
        let mut releases = vec![release("A"), release("B")];
        let start = tokio::time::Instant::now();

        enrich_releases(&enricher, &mut releases, Duration::from_secs(1)).await;

        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_lookup_request_query() {
        let enricher = MusicBrainzEnricher::new(
            HttpClient::new(),
            "https://musicbrainz.org/",
            "release-aggregator/test",
        );
        let url = enricher
            .request("Artist \"X\"", "Album Y")
            .resolved_url()
            .unwrap();
        assert_eq!(url.path(), "/ws/2/release");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs[0].1,
            "artist:\"Artist X\" AND release:\"Album Y\"".to_string()
        );
        assert!(pairs.contains(&("limit".into(), "1".into())));
    }
}
