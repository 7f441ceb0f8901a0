//! MetalStorm release listings (HTML).
//!
//! Two listings share one markup: upcoming releases (a single page) and new
//! releases (newest first, paginated with `?page=N`, optionally narrowed by a
//! `genre` parameter). Markup varies, so rows are read with a `.release` card
//! layout first and a plain table layout as fallback.

use std::sync::LazyLock;

use tracing::debug;

use super::extract::{ExtractedRow, FieldRule, RowLayout, extract_rows};
use super::{PageCursor, Pagination, SourceAdapter, SourceError, join_base};
use crate::fetch::RequestSpec;
use crate::model::{RawCandidate, SourceId};

const DEFAULT_BASE_URL: &str = "https://metalstorm.net";
const UPCOMING_PATH: &str = "/events/upcoming_releases.php";
const NEW_RELEASES_PATH: &str = "/events/new_releases.php";

static LAYOUTS: LazyLock<Vec<RowLayout>> = LazyLock::new(|| {
    vec![
        RowLayout::new(".release")
            .title(vec![
                FieldRule::text(".release-title a"),
                FieldRule::text(".release-title"),
            ])
            .artist(vec![
                FieldRule::text(".release-artist a"),
                FieldRule::text(".release-artist"),
            ])
            .date(vec![
                FieldRule::attr(".release-date time", "datetime"),
                FieldRule::text(".release-date"),
            ])
            .link(vec![FieldRule::attr(".release-title a", "href")]),
        RowLayout::new("table tr")
            .with_min_cells("td", 3)
            .artist(vec![FieldRule::text("td:nth-of-type(1)")])
            .title(vec![FieldRule::text("td:nth-of-type(2)")])
            .date(vec![FieldRule::text("td:nth-of-type(3)")])
            .link(vec![FieldRule::attr("td:nth-of-type(2) a", "href")]),
    ]
});

/// Adapter for one MetalStorm listing.
#[derive(Debug, Clone)]
pub struct MetalStormAdapter {
    source: SourceId,
    base_url: String,
}

impl MetalStormAdapter {
    /// Upcoming releases: one page, every row kept.
    #[must_use]
    pub fn upcoming() -> Self {
        Self {
            source: SourceId::MetalstormUpcoming,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// New releases: paginated, stops at the first row older than the window.
    #[must_use]
    pub fn new_releases() -> Self {
        Self {
            source: SourceId::MetalstormNew,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn path(&self) -> &'static str {
        match self.source {
            SourceId::MetalstormNew => NEW_RELEASES_PATH,
            _ => UPCOMING_PATH,
        }
    }

    fn to_candidate(&self, row: ExtractedRow, cursor: &PageCursor<'_>) -> RawCandidate {
        let mut candidate = cursor.candidate(
            self.source,
            row.title.unwrap_or_default(),
            row.artist.unwrap_or_default(),
        );
        if let Some(date) = row.date {
            candidate = candidate.with_date(date);
        }
        if let Some(link) = row.link {
            candidate = candidate.with_url(link);
        }
        candidate
    }
}

impl SourceAdapter for MetalStormAdapter {
    fn source(&self) -> SourceId {
        self.source
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn pagination(&self) -> Pagination {
        match self.source {
            SourceId::MetalstormNew => Pagination::Paged {
                stop_before_lower_bound: true,
            },
            _ => Pagination::Single,
        }
    }

    fn sweeps_genres(&self) -> bool {
        self.source == SourceId::MetalstormNew
    }

    fn request(&self, cursor: &PageCursor<'_>) -> Result<RequestSpec, SourceError> {
        let mut request = RequestSpec::new(join_base(&self.base_url, self.path()));
        if let Pagination::Paged { .. } = self.pagination() {
            request = request.with_query("page", cursor.page.to_string());
            if let Some(genre) = cursor.genre {
                request = request.with_query("genre", genre);
            }
        }
        Ok(request)
    }

    fn extract(
        &self,
        body: &str,
        cursor: &PageCursor<'_>,
    ) -> Result<Vec<RawCandidate>, SourceError> {
        let rows = extract_rows(body, &LAYOUTS, &self.base_url);
        debug!(source = %self.source, page = cursor.page, rows = rows.len(), "extracted listing rows");
        Ok(rows
            .into_iter()
            .map(|row| self.to_candidate(row, cursor))
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

    const CARD_PAGE: &str = r#"
        <div class="releases">
          <div class="release">
            <div class="release-title"><a href="/bands/album.php?album_id=42">Album Y</a></div>
            <div class="release-artist"><a href="/bands/band.php?band_id=7">Artist X</a></div>
            <div class="release-date">15 Mar 2024</div>
          </div>
          <div class="release">
            <div class="release-title">Untitled Demo</div>
            <div class="release-artist">Oak</div>
          </div>
        </div>
    "#;

    #[test]
    fn test_upcoming_is_single_page_without_params() {
        let window = window();
        let adapter = MetalStormAdapter::upcoming();
        assert_eq!(adapter.pagination(), Pagination::Single);
        let request = adapter
            .request(&PageCursor::new(1, Some("doom"), &window))
            .unwrap();
        assert_eq!(
            request.resolved_url().unwrap().as_str(),
            "https://metalstorm.net/events/upcoming_releases.php"
        );
    }

    #[test]
    fn test_new_releases_pages_with_genre() {
        let window = window();
        let adapter = MetalStormAdapter::new_releases();
        assert_eq!(
            adapter.pagination(),
            Pagination::Paged {
                stop_before_lower_bound: true
            }
        );
        let request = adapter
            .request(&PageCursor::new(3, Some("doom"), &window))
            .unwrap();
        assert_eq!(
            request.resolved_url().unwrap().as_str(),
            "https://metalstorm.net/events/new_releases.php?page=3&genre=doom"
        );
    }

    #[test]
    fn test_extract_card_layout() {
        let window = window();
        let adapter = MetalStormAdapter::new_releases();
        let candidates = adapter
            .extract(CARD_PAGE, &PageCursor::new(1, Some("doom"), &window))
            .unwrap();
        assert_eq!(candidates.len(), 2);

        let first = &candidates[0];
        assert_eq!(first.source, SourceId::MetalstormNew);
        assert_eq!(first.raw_title, "Album Y");
        assert_eq!(first.raw_artist, "Artist X");
        assert_eq!(first.raw_date_text.as_deref(), Some("15 Mar 2024"));
        assert_eq!(first.genre_tag.as_deref(), Some("doom"));
        assert_eq!(
            first.url.as_deref(),
            Some("https://metalstorm.net/bands/album.php?album_id=42")
        );

        let second = &candidates[1];
        assert_eq!(second.raw_title, "Untitled Demo");
        assert!(second.raw_date_text.is_none());
        assert!(second.url.is_none());
    }

    #[test]
    fn test_extract_table_fallback() {
        let window = window();
        let html = r"
            <table>
              <tr><td>Oak</td><td>Blackwater</td><td>Dec 20</td></tr>
            </table>
        ";
        let candidates = MetalStormAdapter::upcoming()
            .extract(html, &PageCursor::new(1, None, &window))
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].raw_artist, "Oak");
        assert_eq!(candidates[0].raw_title, "Blackwater");
        assert_eq!(candidates[0].raw_date_text.as_deref(), Some("Dec 20"));
    }

    #[test]
    fn test_extract_empty_page() {
        let window = window();
        let candidates = MetalStormAdapter::new_releases()
            .extract("<html><body></body></html>", &PageCursor::new(5, None, &window))
            .unwrap();
        assert!(candidates.is_empty());
    }
}
