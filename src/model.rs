//! Core release records shared by adapters, the merger and the snapshot writer.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Origin of a release sighting.
///
/// Declared order matches the default source order of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceId {
    /// Metal Archives upcoming-releases JSON endpoint.
    MetalArchives,
    /// MetalStorm upcoming releases listing (single page).
    MetalstormUpcoming,
    /// MetalStorm new releases listing (paginated, newest first).
    MetalstormNew,
    /// MusicBrainz tag search by date range.
    Musicbrainz,
}

impl SourceId {
    /// Returns the stable label used in logs, config keys and snapshot output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MetalArchives => "metal-archives",
            Self::MetalstormUpcoming => "metalstorm-upcoming",
            Self::MetalstormNew => "metalstorm-new",
            Self::Musicbrainz => "musicbrainz",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = UnknownSource;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "metal-archives" => Ok(Self::MetalArchives),
            "metalstorm-upcoming" => Ok(Self::MetalstormUpcoming),
            "metalstorm-new" => Ok(Self::MetalstormNew),
            "musicbrainz" => Ok(Self::Musicbrainz),
            other => Err(UnknownSource(other.to_string())),
        }
    }
}

/// A source label that names no known source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown source '{0}'")]
pub struct UnknownSource(pub String);

/// A single release sighting from one source/genre/page, before dedup.
///
/// Dates stay unparsed here; normalization happens once, in [`crate::dates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCandidate {
    pub source: SourceId,
    pub raw_title: String,
    pub raw_artist: String,
    pub raw_date_text: Option<String>,
    pub genre_tag: Option<String>,
    pub url: Option<String>,
}

impl RawCandidate {
    /// Creates a candidate with no date, genre or link.
    #[must_use]
    pub fn new(source: SourceId, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            source,
            raw_title: title.into(),
            raw_artist: artist.into(),
            raw_date_text: None,
            genre_tag: None,
            url: None,
        }
    }

    #[must_use]
    pub fn with_date(mut self, date_text: impl Into<String>) -> Self {
        self.raw_date_text = Some(date_text.into());
        self
    }

    #[must_use]
    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre_tag = Some(genre.into());
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Normalized identity of a release: lowercase trimmed `(title, artist)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReleaseKey {
    title: String,
    artist: String,
}

impl ReleaseKey {
    /// Builds the key, or `None` when either part is blank after trimming.
    #[must_use]
    pub fn new(title: &str, artist: &str) -> Option<Self> {
        let title = title.trim().to_lowercase();
        let artist = artist.trim().to_lowercase();
        if title.is_empty() || artist.is_empty() {
            return None;
        }
        Some(Self { title, artist })
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn artist(&self) -> &str {
        &self.artist
    }
}

/// Corroborating data from the MusicBrainz lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    /// MusicBrainz release identifier.
    pub musicbrainz_id: String,
    /// Release date as reported by MusicBrainz (may be partial, e.g. `2024`).
    pub date: Option<String>,
}

/// The deduplicated release exposed in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRelease {
    pub artist: String,
    pub title: String,
    pub release_date: Option<NaiveDate>,
    /// Ordered set: first-seen order, no duplicates.
    pub genres: Vec<String>,
    pub url: Option<String>,
    pub source_of_record: SourceId,
    pub enrichment: Option<Enrichment>,
}

impl CanonicalRelease {
    /// Returns true when `tag` is already present (trimmed, case-insensitive).
    #[must_use]
    pub fn has_genre(&self, tag: &str) -> bool {
        let needle = tag.trim().to_lowercase();
        self.genres
            .iter()
            .any(|g| g.trim().to_lowercase() == needle)
    }

    /// Joins genres the way the snapshot renders them.
    #[must_use]
    pub fn genre_label(&self) -> String {
        self.genres.join(", ")
    }
}
