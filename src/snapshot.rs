//! JSON snapshot of a completed run.
//!
//! Schema (camelCase):
//!
//! ```json
//! {
//!   "generatedAt": "2024-03-20T08:00:00Z",
//!   "count": 1,
//!   "releases": [
//!     {
//!       "artist": "Artist X",
//!       "title": "Album Y",
//!       "releaseDate": "2024-03-15",
//!       "genre": "doom, sludge",
//!       "url": null,
//!       "source": "metalstorm-new",
//!       "musicbrainzId": "…",
//!       "musicbrainzDate": "2024-03-15"
//!     }
//!   ]
//! }
//! ```
//!
//! The two `musicbrainz*` fields are omitted for unenriched releases.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::model::{CanonicalRelease, SourceId};

/// Errors writing the snapshot file.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write snapshot to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Filtered, sorted, enriched output of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub releases: Vec<CanonicalRelease>,
}

impl Snapshot {
    #[must_use]
    pub fn new(generated_at: DateTime<Utc>, releases: Vec<CanonicalRelease>) -> Self {
        Self {
            generated_at,
            releases,
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.releases.len()
    }

    /// Renders the snapshot as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Serialize`] if serialization fails.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        let document = SnapshotDocument {
            generated_at: self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            count: self.count(),
            releases: self.releases.iter().map(ReleaseEntry::from).collect(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotDocument<'a> {
    generated_at: String,
    count: usize,
    releases: Vec<ReleaseEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseEntry<'a> {
    artist: &'a str,
    title: &'a str,
    release_date: Option<NaiveDate>,
    genre: String,
    url: Option<&'a str>,
    source: SourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    musicbrainz_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    musicbrainz_date: Option<&'a str>,
}

impl<'a> From<&'a CanonicalRelease> for ReleaseEntry<'a> {
    fn from(release: &'a CanonicalRelease) -> Self {
        let enrichment = release.enrichment.as_ref();
        Self {
            artist: &release.artist,
            title: &release.title,
            release_date: release.release_date,
            genre: release.genre_label(),
            url: release.url.as_deref(),
            source: release.source_of_record,
            musicbrainz_id: enrichment.map(|e| e.musicbrainz_id.as_str()),
            musicbrainz_date: enrichment.and_then(|e| e.date.as_deref()),
        }
    }
}

/// Writes `snapshot` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`SnapshotError`] if the directory cannot be created, the snapshot
/// cannot be serialized or the file cannot be written.
#[instrument(skip(snapshot), fields(count = snapshot.count()))]
pub fn write_snapshot(snapshot: &Snapshot, path: &Path) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| SnapshotError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let json = snapshot.to_json()?;
    fs::write(path, json).map_err(|source| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), count = snapshot.count(), "wrote snapshot");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use serde_json::Value;

    use super::*;
    use crate::model::Enrichment;

    fn sample() -> Snapshot {
        let enriched = CanonicalRelease {
            artist: "Artist X".into(),
            title: "Album Y".into(),
            release_date: NaiveDate::from_ymd_opt(2024, 3, 15),
            genres: vec!["doom".into(), "sludge".into()],
            url: Some("https://metalstorm.net/a".into()),
            source_of_record: SourceId::MetalstormNew,
            enrichment: Some(Enrichment {
                musicbrainz_id: "mbid-1".into(),
                date: None,
            }),
        };
        let plain = CanonicalRelease {
            artist: "Oak".into(),
            title: "Blackwater".into(),
            release_date: None,
            genres: Vec::new(),
            url: None,
            source_of_record: SourceId::MetalArchives,
            enrichment: None,
        };
        Snapshot::new(
            Utc.with_ymd_and_hms(2024, 3, 20, 8, 0, 0).unwrap(),
            vec![enriched, plain],
        )
    }

    #[test]
    fn test_json_schema() {
        let value: Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(value["generatedAt"], "2024-03-20T08:00:00Z");
        assert_eq!(value["count"], 2);

        let first = &value["releases"][0];
        assert_eq!(first["artist"], "Artist X");
        assert_eq!(first["title"], "Album Y");
        assert_eq!(first["releaseDate"], "2024-03-15");
        assert_eq!(first["genre"], "doom, sludge");
        assert_eq!(first["source"], "metalstorm-new");
        assert_eq!(first["musicbrainzId"], "mbid-1");
        assert!(first.get("musicbrainzDate").is_none());

        let second = &value["releases"][1];
        assert!(second["releaseDate"].is_null());
        assert!(second["url"].is_null());
        assert_eq!(second["genre"], "");
        assert!(second.get("musicbrainzId").is_none());
    }

    #[test]
    fn test_write_snapshot_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/snapshot.json");

        write_snapshot(&sample(), &path).unwrap();

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["count"], 2);
    }

    #[test]
    fn test_write_snapshot_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let error = write_snapshot(&sample(), &blocker.join("snapshot.json")).unwrap_err();
        assert!(matches!(error, SnapshotError::CreateDir { .. }));
    }
}
