//! Sequences sources, genre passes and pages into one merged snapshot.
//!
//! Order is part of the contract: sources run in declared order, genres in
//! declared order and pages in increasing order, so the first sighting of a
//! release (which fixes its scalar fields) is deterministic. A failure ends
//! only the pass it happened in.

use std::cmp::Reverse;
use std::fmt;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::{RunConfig, SourceSettings, UndatedPolicy};
use crate::dates::{DateWindow, normalize_opt};
use crate::enrich::{MusicBrainzEnricher, ReleaseEnricher, enrich_releases};
use crate::fetch::{
    ChallengeAwareFetcher, FetchError, HttpClient, IdentityPair, PolitenessGate, RateLimiter,
    RequestSpec, RetryPolicy, parse_retry_after,
};
use crate::merge::{MergeOutcome, ReleaseIndex};
use crate::model::CanonicalRelease;
use crate::snapshot::Snapshot;
use crate::sources::{
    IdentityKind, PageCursor, Pagination, SourceAdapter, SourceError, adapter_for,
};

/// One source and the genre passes to sweep it with.
#[derive(Debug)]
pub struct SourcePlan {
    pub adapter: Box<dyn SourceAdapter>,
    /// Empty means a single genre-less pass.
    pub genres: Vec<String>,
}

impl SourcePlan {
    #[must_use]
    pub fn new(adapter: Box<dyn SourceAdapter>, genres: Vec<String>) -> Self {
        Self { adapter, genres }
    }

    /// Builds the plan for a configured source. Genres are dropped for
    /// sources that cannot filter by genre.
    #[must_use]
    pub fn from_settings(settings: &SourceSettings) -> Self {
        let adapter = adapter_for(settings.source, settings.base_url.as_deref());
        if !adapter.sweeps_genres() {
            if settings.genres.as_ref().is_some_and(|g| !g.is_empty()) {
                warn!(source = %settings.source, "source has no genre filter; ignoring configured genres");
            }
            return Self::new(adapter, Vec::new());
        }
        let genres = settings
            .genres
            .clone()
            .unwrap_or_else(|| adapter.default_genres());
        Self { adapter, genres }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub pages_fetched: u32,
    pub failed_passes: u32,
    pub skipped_passes: u32,
    pub candidates_seen: u32,
    pub created: u32,
    pub updated: u32,
    pub rejected: u32,
    pub undated: u32,
    pub out_of_window: u32,
    pub enriched: u32,
}

/// Snapshot and counters of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub snapshot: Snapshot,
    pub stats: RunStats,
}

/// Why a pass ended early.
#[derive(Debug, Error)]
enum PassError {
    #[error("robots.txt disallows {path}")]
    Disallowed { path: String },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

enum PageOutcome {
    Continue,
    EndOfPass,
}

/// Runs the whole pipeline for one configuration.
pub struct Orchestrator {
    plans: Vec<SourcePlan>,
    gate: PolitenessGate,
    limiter: RateLimiter,
    fetcher: ChallengeAwareFetcher,
    enricher: Option<Box<dyn ReleaseEnricher>>,
    enrichment_delay: Duration,
    browser_identities: IdentityPair,
    api_identities: IdentityPair,
    as_of: NaiveDate,
    window: DateWindow,
    max_pages: u32,
    undated: UndatedPolicy,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("plans", &self.plans)
            .field("window", &self.window)
            .field("max_pages", &self.max_pages)
            .field("undated", &self.undated)
            .field("enrichment", &self.enricher.is_some())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator with explicit plans and fetcher. Enrichment is
    /// off until [`Orchestrator::with_enricher`] is called.
    #[must_use]
    pub fn new(config: &RunConfig, fetcher: ChallengeAwareFetcher, plans: Vec<SourcePlan>) -> Self {
        Self {
            plans,
            gate: PolitenessGate::new(config.browser_identities.primary.clone(), config.delay_floor),
            limiter: RateLimiter::new(),
            fetcher,
            enricher: None,
            enrichment_delay: config.enrichment.delay,
            browser_identities: config.browser_identities.clone(),
            api_identities: IdentityPair::single(config.api_identity.clone()),
            as_of: config.as_of,
            window: config.window,
            max_pages: config.max_pages,
            undated: config.undated,
        }
    }

    /// Builds the production pipeline: configured sources, default retry
    /// policy, MusicBrainz enrichment when enabled.
    #[must_use]
    pub fn from_config(config: &RunConfig) -> Self {
        let client =
            HttpClient::new_with_timeouts(config.connect_timeout_secs, config.read_timeout_secs);
        let plans = config.sources.iter().map(SourcePlan::from_settings).collect();
        let fetcher = ChallengeAwareFetcher::new(client.clone(), RetryPolicy::default());
        let orchestrator = Self::new(config, fetcher, plans);

        if config.enrichment.enabled {
            orchestrator.with_enricher(Box::new(MusicBrainzEnricher::new(
                client,
                &config.enrichment.base_url,
                config.api_identity.clone(),
            )))
        } else {
            orchestrator
        }
    }

    #[must_use]
    pub fn with_enricher(mut self, enricher: Box<dyn ReleaseEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Runs every pass, then filters, sorts and enriches.
    #[instrument(skip(self), fields(window_start = %self.window.start(), window_end = %self.window.end()))]
    pub async fn run(&self) -> RunReport {
        let mut index = ReleaseIndex::new();
        let mut stats = RunStats::default();

        for plan in &self.plans {
            let adapter = plan.adapter.as_ref();
            info!(source = %adapter.source(), genres = plan.genres.len(), "starting source");
            if plan.genres.is_empty() {
                self.run_pass(adapter, None, &mut index, &mut stats).await;
            } else {
                for genre in &plan.genres {
                    self.run_pass(adapter, Some(genre), &mut index, &mut stats).await;
                }
            }
        }
        info!(releases = index.len(), "all sources done");

        let mut releases = self.finalize(index, &mut stats);

        if let Some(enricher) = &self.enricher {
            let enriched =
                enrich_releases(enricher.as_ref(), &mut releases, self.enrichment_delay).await;
            stats.enriched = u32::try_from(enriched).unwrap_or(u32::MAX);
            info!(enriched, total = releases.len(), "enrichment done");
        }

        RunReport {
            snapshot: Snapshot::new(Utc::now(), releases),
            stats,
        }
    }

    async fn run_pass(
        &self,
        adapter: &dyn SourceAdapter,
        genre: Option<&str>,
        index: &mut ReleaseIndex,
        stats: &mut RunStats,
    ) {
        let max_pages = match adapter.pagination() {
            Pagination::Single => 1,
            Pagination::Paged { .. } => self.max_pages,
        };

        for page in 1..=max_pages {
            let cursor = PageCursor::new(page, genre, &self.window);
            match self.run_page(adapter, &cursor, index, stats).await {
                Ok(PageOutcome::Continue) => {}
                Ok(PageOutcome::EndOfPass) => break,
                Err(PassError::Disallowed { path }) => {
                    info!(source = %adapter.source(), path = %path, "robots.txt disallows path; skipping pass");
                    stats.skipped_passes += 1;
                    break;
                }
                Err(PassError::Source(SourceError::MalformedResponse {
                    origin,
                    reason,
                    snippet,
                })) => {
                    warn!(source = %origin, page, reason = %reason, snippet = %snippet, "malformed response; abandoning pass");
                    stats.failed_passes += 1;
                    break;
                }
                Err(PassError::Fetch(FetchError::Challenge { url, status, snippet })) => {
                    warn!(source = %adapter.source(), page, url = %url, status, snippet = %snippet, "blocked by challenge; abandoning pass");
                    stats.failed_passes += 1;
                    break;
                }
                Err(error) => {
                    warn!(source = %adapter.source(), genre = ?genre, page, error = %error, "page failed; abandoning pass");
                    stats.failed_passes += 1;
                    break;
                }
            }
        }
    }

    #[instrument(skip(self, adapter, cursor, index, stats), fields(source = %adapter.source(), page = cursor.page, genre = ?cursor.genre))]
    async fn run_page(
        &self,
        adapter: &dyn SourceAdapter,
        cursor: &PageCursor<'_>,
        index: &mut ReleaseIndex,
        stats: &mut RunStats,
    ) -> Result<PageOutcome, PassError> {
        let request = adapter.request(cursor)?;
        let path = request.robots_path()?;
        let policy = self
            .gate
            .evaluate(self.fetcher.client(), adapter.base_url(), &path)
            .await;
        if !policy.allowed {
            return Err(PassError::Disallowed { path });
        }

        let body = self.fetch_page(adapter, &request, policy.min_delay).await?;
        stats.pages_fetched += 1;

        let candidates = adapter.extract(&body, cursor)?;
        if candidates.is_empty() {
            debug!("empty page; ending pass");
            return Ok(PageOutcome::EndOfPass);
        }

        let stop_before_lower_bound = matches!(
            adapter.pagination(),
            Pagination::Paged {
                stop_before_lower_bound: true
            }
        );

        for candidate in candidates {
            stats.candidates_seen += 1;
            let date = normalize_opt(candidate.raw_date_text.as_deref(), self.as_of);
            if date.is_none()
                && let Some(raw) = candidate.raw_date_text.as_deref()
            {
                debug!(raw_date = %raw, title = %candidate.raw_title, "unparsable date");
            }

            if stop_before_lower_bound
                && let Some(date) = date
                && date < self.window.start()
            {
                info!(date = %date, lower_bound = %self.window.start(), "row older than window; ending pass");
                return Ok(PageOutcome::EndOfPass);
            }

            match index.merge(candidate, date) {
                MergeOutcome::Created => stats.created += 1,
                MergeOutcome::Updated => stats.updated += 1,
                MergeOutcome::Unchanged => {}
                MergeOutcome::Rejected => stats.rejected += 1,
            }
        }
        Ok(PageOutcome::Continue)
    }

    /// Fetches with politeness spacing, identity fallback and the adapter's
    /// rate-limit rule.
    async fn fetch_page(
        &self,
        adapter: &dyn SourceAdapter,
        request: &RequestSpec,
        min_delay: Duration,
    ) -> Result<String, FetchError> {
        let url = request.resolved_url()?.to_string();
        let identities = match adapter.identity() {
            IdentityKind::Browser => &self.browser_identities,
            IdentityKind::Application => &self.api_identities,
        };
        let rule = adapter.rate_limit_rule();
        let mut reissues = 0;

        loop {
            self.limiter.acquire(&url, min_delay).await;
            let error = match self.fetcher.fetch_with_fallback(request, identities).await {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };

            let Some(rule) = rule.filter(|rule| error.status() == Some(rule.status)) else {
                return Err(error);
            };
            if reissues >= rule.max_reissues {
                warn!(url = %url, reissues, "still rate limited; giving up");
                return Err(error);
            }
            reissues += 1;

            let wait = match &error {
                FetchError::HttpStatus {
                    retry_after: Some(value),
                    ..
                } => parse_retry_after(value).map_or(rule.wait, |server| server.max(rule.wait)),
                _ => rule.wait,
            };
            warn!(url = %url, reissue = reissues, wait_ms = wait.as_millis(), "rate limited; waiting before re-issuing");
            tokio::time::sleep(wait).await;
        }
    }

    /// Applies the window filter and undated policy, then sorts.
    fn finalize(&self, index: ReleaseIndex, stats: &mut RunStats) -> Vec<CanonicalRelease> {
        let mut releases: Vec<CanonicalRelease> = index
            .into_releases()
            .into_iter()
            .filter(|release| match release.release_date {
                Some(date) if self.window.contains(date) => true,
                Some(_) => {
                    stats.out_of_window += 1;
                    false
                }
                None => {
                    stats.undated += 1;
                    self.undated == UndatedPolicy::Keep
                }
            })
            .collect();
        sort_releases(&mut releases);
        releases
    }
}

/// Sorts by release date, newest first; undated releases go last. Ties keep
/// their existing order.
pub fn sort_releases(releases: &mut [CanonicalRelease]) {
    releases.sort_by_key(|release| Reverse(release.release_date));
}
