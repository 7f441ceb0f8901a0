//! Metal Archives upcoming-releases JSON endpoint.
//!
//! The endpoint returns a DataTables payload: `aaData` is a list of rows whose
//! cells are HTML fragments. Cell 0 is the date, cell 1 the artist and cell 2
//! the album (its first link is the album page).

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::extract::fragment_text_and_link;
use super::{PageCursor, SourceAdapter, SourceError, join_base};
use crate::fetch::RequestSpec;
use crate::model::{RawCandidate, SourceId};

const DEFAULT_BASE_URL: &str = "https://www.metal-archives.com";
const UPCOMING_PATH: &str = "/release/ajax-upcoming/json/1";
const PAGE_LENGTH: u32 = 200;

#[derive(Debug, Deserialize)]
struct UpcomingPayload {
    #[serde(rename = "aaData", default)]
    rows: Vec<Vec<Value>>,
}

/// Adapter for the Metal Archives upcoming releases listing.
#[derive(Debug, Clone)]
pub struct MetalArchivesAdapter {
    base_url: String,
}

impl Default for MetalArchivesAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MetalArchivesAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    #[must_use]
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl SourceAdapter for MetalArchivesAdapter {
    fn source(&self) -> SourceId {
        SourceId::MetalArchives
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, cursor: &PageCursor<'_>) -> Result<RequestSpec, SourceError> {
        Ok(RequestSpec::new(join_base(&self.base_url, UPCOMING_PATH))
            .with_query("iDisplayStart", "0")
            .with_query("iDisplayLength", PAGE_LENGTH.to_string())
            .with_query("includeVersions", "0")
            .with_query("fromDate", cursor.window.start().to_string())
            .with_query("toDate", cursor.window.end().to_string())
            .with_query("sEcho", "1"))
    }

    fn extract(
        &self,
        body: &str,
        cursor: &PageCursor<'_>,
    ) -> Result<Vec<RawCandidate>, SourceError> {
        let payload: UpcomingPayload = serde_json::from_str(body)
            .map_err(|e| SourceError::malformed(self.source(), e, body))?;
        info!(rows = payload.rows.len(), "Metal Archives returned rows");

        let mut candidates = Vec::with_capacity(payload.rows.len());
        for row in &payload.rows {
            if row.len() < 3 {
                debug!(cells = row.len(), "skipping short row");
                continue;
            }
            let date_text = cell_text(&row[0]);
            let (artist, _) = fragment_text_and_link(&cell_text(&row[1]));
            let (title, link) = fragment_text_and_link(&cell_text(&row[2]));

            let mut candidate = cursor.candidate(self.source(), title, artist);
            if !date_text.trim().is_empty() {
                candidate = candidate.with_date(date_text.trim());
            }
            if let Some(link) = link {
                candidate = candidate.with_url(link);
            }
            candidates.push(candidate);
        }
        Ok(candidates)
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
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
    fn test_request_carries_window_params() {
        let window = window();
        let adapter = MetalArchivesAdapter::new();
        let request = adapter.request(&PageCursor::new(1, None, &window)).unwrap();
        let url = request.resolved_url().unwrap();
        assert_eq!(url.path(), UPCOMING_PATH);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("fromDate".into(), "2024-01-01".into())));
        assert!(pairs.contains(&("toDate".into(), "2024-03-31".into())));
        assert!(pairs.contains(&("iDisplayLength".into(), "200".into())));
        assert!(pairs.contains(&("sEcho".into(), "1".into())));
    }

    #[test]
    fn test_extract_rows_and_skip_short_ones() {
        let window = window();
        let body = r#"{
            "iTotalRecords": 2,
            "aaData": [
                ["2024-03-15",
                 "<a href=\"https://www.metal-archives.com/bands/Oak/1\">Oak</a>",
                 "<a href=\"https://www.metal-archives.com/albums/Oak/Blackwater/2\">Blackwater</a>",
                 "Full-length"],
                ["2024-03-16", "Short"]
            ]
        }"#;
        let adapter = MetalArchivesAdapter::new();
        let candidates = adapter
            .extract(body, &PageCursor::new(1, None, &window))
            .unwrap();
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.source, SourceId::MetalArchives);
        assert_eq!(c.raw_artist, "Oak");
        assert_eq!(c.raw_title, "Blackwater");
        assert_eq!(c.raw_date_text.as_deref(), Some("2024-03-15"));
        assert_eq!(
            c.url.as_deref(),
            Some("https://www.metal-archives.com/albums/Oak/Blackwater/2")
        );
        assert!(c.genre_tag.is_none());
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let window = window();
        let error = MetalArchivesAdapter::new()
            .extract("<html>oops</html>", &PageCursor::new(1, None, &window))
            .unwrap_err();
        match error {
            SourceError::MalformedResponse {
                origin, snippet, ..
            } => {
                assert_eq!(origin, SourceId::MetalArchives);
                assert_eq!(snippet, "<html>oops</html>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_aadata_yields_nothing() {
        let window = window();
        let candidates = MetalArchivesAdapter::new()
            .extract("{}", &PageCursor::new(1, None, &window))
            .unwrap();
        assert!(candidates.is_empty());
    }
}
