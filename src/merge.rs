//! Cross-source deduplication keyed by normalized `(title, artist)`.
//!
//! The first sighting of a key fixes every scalar field (casing, date, source
//! of record). Later sightings only add genre tags that are not yet present and
//! fill a missing url.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::model::{CanonicalRelease, RawCandidate, ReleaseKey};
use crate::text::collapse_whitespace;

/// What a merge did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new release was inserted.
    Created,
    /// An existing release gained a genre or url.
    Updated,
    /// The key already existed and nothing changed.
    Unchanged,
    /// Blank title or artist.
    Rejected,
}

/// Insertion-ordered identity map of canonical releases.
#[derive(Debug, Default)]
pub struct ReleaseIndex {
    releases: Vec<CanonicalRelease>,
    positions: HashMap<ReleaseKey, usize>,
}

impl ReleaseIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one candidate into the index.
    pub fn merge(&mut self, candidate: RawCandidate, date: Option<NaiveDate>) -> MergeOutcome {
        let Some(key) = ReleaseKey::new(&candidate.raw_title, &candidate.raw_artist) else {
            debug!(
                source = %candidate.source,
                title = %candidate.raw_title,
                artist = %candidate.raw_artist,
                "rejecting candidate with blank title or artist"
            );
            return MergeOutcome::Rejected;
        };

        let genre = candidate
            .genre_tag
            .as_deref()
            .map(collapse_whitespace)
            .filter(|tag| !tag.is_empty());

        if let Some(&position) = self.positions.get(&key) {
            let existing = &mut self.releases[position];
            let mut changed = false;
            if let Some(tag) = genre
                && !existing.has_genre(&tag)
            {
                existing.genres.push(tag);
                changed = true;
            }
            if existing.url.is_none() && candidate.url.is_some() {
                existing.url = candidate.url;
                changed = true;
            }
            return if changed {
                MergeOutcome::Updated
            } else {
                MergeOutcome::Unchanged
            };
        }

        self.positions.insert(key, self.releases.len());
        self.releases.push(CanonicalRelease {
            artist: candidate.raw_artist.trim().to_string(),
            title: candidate.raw_title.trim().to_string(),
            release_date: date,
            genres: genre.into_iter().collect(),
            url: candidate.url,
            source_of_record: candidate.source,
            enrichment: None,
        });
        MergeOutcome::Created
    }

    /// Looks up a release by its raw title and artist.
    #[must_use]
    pub fn get(&self, title: &str, artist: &str) -> Option<&CanonicalRelease> {
        let key = ReleaseKey::new(title, artist)?;
        self.positions.get(&key).map(|&i| &self.releases[i])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.releases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    /// Releases in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &CanonicalRelease> {
        self.releases.iter()
    }

    #[must_use]
    pub fn into_releases(self) -> Vec<CanonicalRelease> {
        self.releases
    }
}
