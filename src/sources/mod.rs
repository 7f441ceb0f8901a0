//! Source adapters: turn fetched listing content into raw release candidates.
//!
//! Each adapter describes how to request one page of its source and how to
//! extract candidates from the body. Adapters are pure: the orchestrator owns
//! every network call, delay and date decision.
//!
//! # Architecture
//!
//! - [`SourceAdapter`] - trait every source implements
//! - [`PageCursor`] - page number, genre pass and date window of one request
//! - [`extract`] - declarative field and row-layout rules for HTML listings
//! - [`MetalArchivesAdapter`] - JSON upcoming-releases endpoint
//! - [`MetalStormAdapter`] - upcoming (single page) and new releases (paged)
//! - [`MusicBrainzTagAdapter`] - tag search by date range
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use aggregator_core::dates::DateWindow;
//! use aggregator_core::model::SourceId;
//! use aggregator_core::sources::{PageCursor, adapter_for};
//!
//! let window = DateWindow::new(
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
//! );
//! let adapter = adapter_for(SourceId::MetalstormNew, None);
//! let cursor = PageCursor::new(2, Some("doom"), &window);
//! let request = adapter.request(&cursor).unwrap();
//! assert!(request.resolved_url().unwrap().as_str().contains("page=2"));
//! ```

pub mod extract;
mod metal_archives;
mod metalstorm;
pub(crate) mod musicbrainz;

pub use metal_archives::MetalArchivesAdapter;
pub use metalstorm::MetalStormAdapter;
pub use musicbrainz::MusicBrainzTagAdapter;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::dates::DateWindow;
use crate::fetch::{RequestSpec, body_snippet};
use crate::model::{RawCandidate, SourceId};

/// How many pages a source pass may span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// One request per pass.
    Single,
    /// Pages 1..=cap, newest first.
    Paged {
        /// End the pass at the first row dated before the window start.
        stop_before_lower_bound: bool,
    },
}

/// Which identity a source is fetched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    /// Browser identity with fallback on challenge.
    Browser,
    /// Application identity (API etiquette); no fallback.
    Application,
}

/// "Try again later" status handled outside the generic retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Status that signals the rate limit.
    pub status: u16,
    /// Fixed wait before re-issuing; a longer Retry-After wins.
    pub wait: Duration,
    /// Maximum number of re-issues after the first request.
    pub max_reissues: u32,
}

/// Position of one request within a source pass.
#[derive(Debug, Clone, Copy)]
pub struct PageCursor<'a> {
    /// 1-based page number.
    pub page: u32,
    /// Genre tag of the current pass, if the source is swept per genre.
    pub genre: Option<&'a str>,
    /// Date window of the run.
    pub window: &'a DateWindow,
}

impl<'a> PageCursor<'a> {
    #[must_use]
    pub fn new(page: u32, genre: Option<&'a str>, window: &'a DateWindow) -> Self {
        Self { page, genre, window }
    }

    /// Builds a candidate pre-filled with this pass's source and genre tag.
    #[must_use]
    pub fn candidate(&self, source: SourceId, title: String, artist: String) -> RawCandidate {
        let candidate = RawCandidate::new(source, title, artist);
        match self.genre {
            Some(genre) => candidate.with_genre(genre),
            None => candidate,
        }
    }
}

/// Errors raised while building a request or reading a body.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The body could not be interpreted (invalid JSON, unexpected shape).
    #[error("malformed response from {origin}: {reason}")]
    MalformedResponse {
        origin: SourceId,
        reason: String,
        /// Bounded excerpt of the offending body.
        snippet: String,
    },

    /// The source needs a genre tag for every request.
    #[error("{origin} requires a genre tag")]
    MissingGenre { origin: SourceId },
}

impl SourceError {
    /// Creates a malformed-response error with a snippet of `body`.
    pub fn malformed(origin: SourceId, reason: impl fmt::Display, body: &str) -> Self {
        Self::MalformedResponse {
            origin,
            reason: reason.to_string(),
            snippet: body_snippet(body),
        }
    }
}

/// A release listing that can be requested page by page and parsed.
pub trait SourceAdapter: Send + Sync + fmt::Debug {
    /// Which source this adapter reads.
    fn source(&self) -> SourceId;

    /// Site root used for robots.txt and relative links.
    fn base_url(&self) -> &str;

    fn pagination(&self) -> Pagination {
        Pagination::Single
    }

    fn identity(&self) -> IdentityKind {
        IdentityKind::Browser
    }

    fn rate_limit_rule(&self) -> Option<RateLimitRule> {
        None
    }

    /// Whether requests can be narrowed by genre. Sources that cannot must
    /// run one genre-less pass, or every row would carry every swept tag.
    fn sweeps_genres(&self) -> bool {
        false
    }

    /// Genre tags swept when the configuration names none.
    fn default_genres(&self) -> Vec<String> {
        Vec::new()
    }

    /// Builds the request for `cursor`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the request cannot be formed.
    fn request(&self, cursor: &PageCursor<'_>) -> Result<RequestSpec, SourceError>;

    /// Extracts candidates from a fetched body. Dates stay unparsed.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::MalformedResponse`] when the body cannot be read.
    fn extract(&self, body: &str, cursor: &PageCursor<'_>)
    -> Result<Vec<RawCandidate>, SourceError>;
}

/// All sources in default run order.
pub const ALL_SOURCES: [SourceId; 4] = [
    SourceId::MetalArchives,
    SourceId::MetalstormUpcoming,
    SourceId::MetalstormNew,
    SourceId::Musicbrainz,
];

/// Builds the adapter for `source`, optionally pointed at another base URL.
#[must_use]
pub fn adapter_for(source: SourceId, base_url: Option<&str>) -> Box<dyn SourceAdapter> {
    match source {
        SourceId::MetalArchives => Box::new(
            base_url.map_or_else(MetalArchivesAdapter::new, MetalArchivesAdapter::with_base_url),
        ),
        SourceId::MetalstormUpcoming => Box::new(
            base_url.map_or_else(MetalStormAdapter::upcoming, |url| {
                MetalStormAdapter::upcoming().with_base_url(url)
            }),
        ),
        SourceId::MetalstormNew => Box::new(
            base_url.map_or_else(MetalStormAdapter::new_releases, |url| {
                MetalStormAdapter::new_releases().with_base_url(url)
            }),
        ),
        SourceId::Musicbrainz => Box::new(
            base_url.map_or_else(MusicBrainzTagAdapter::new, MusicBrainzTagAdapter::with_base_url),
        ),
    }
}

/// Joins a site root and a path without doubling slashes.
pub(crate) fn join_base(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
