//! Declarative extraction rules for HTML listings.
//!
//! A field is read through a priority list of [`FieldRule`]s; the first rule
//! that yields a non-blank value wins. A listing is read through a priority
//! list of [`RowLayout`]s; the first layout that matches at least one row is
//! used for the whole page.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::text::{collapse_whitespace, compile_static_selector, non_blank};

/// What to read from a matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extract {
    /// Whitespace-collapsed text content.
    Text,
    /// Value of the named attribute.
    Attr(&'static str),
}

/// One way of reading a field: a selector relative to the row plus what to read.
#[derive(Debug, Clone)]
pub struct FieldRule {
    selector: Selector,
    extract: Extract,
}

impl FieldRule {
    /// Reads the text of the first element matching `selector`.
    #[must_use]
    pub fn text(selector: &str) -> Self {
        Self {
            selector: compile_static_selector(selector),
            extract: Extract::Text,
        }
    }

    /// Reads attribute `name` of the first element matching `selector`.
    #[must_use]
    pub fn attr(selector: &str, name: &'static str) -> Self {
        Self {
            selector: compile_static_selector(selector),
            extract: Extract::Attr(name),
        }
    }

    /// Applies the rule inside `scope`.
    #[must_use]
    pub fn apply(&self, scope: ElementRef<'_>) -> Option<String> {
        let element = scope.select(&self.selector).next()?;
        match self.extract {
            Extract::Text => non_blank(&element.text().collect::<String>()),
            Extract::Attr(name) => element.value().attr(name).and_then(non_blank),
        }
    }
}

/// Evaluates `rules` in order and returns the first non-blank value.
#[must_use]
pub fn first_match(rules: &[FieldRule], scope: ElementRef<'_>) -> Option<String> {
    rules.iter().find_map(|rule| rule.apply(scope))
}

/// Field values read from one listing row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedRow {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub date: Option<String>,
    pub link: Option<String>,
}

/// A row selector plus per-field rule lists.
#[derive(Debug, Clone)]
pub struct RowLayout {
    rows: Selector,
    min_cells: Option<(Selector, usize)>,
    title: Vec<FieldRule>,
    artist: Vec<FieldRule>,
    date: Vec<FieldRule>,
    link: Vec<FieldRule>,
}

impl RowLayout {
    #[must_use]
    pub fn new(rows: &str) -> Self {
        Self {
            rows: compile_static_selector(rows),
            min_cells: None,
            title: Vec::new(),
            artist: Vec::new(),
            date: Vec::new(),
            link: Vec::new(),
        }
    }

    /// Only counts rows with at least `count` elements matching `cell`.
    #[must_use]
    pub fn with_min_cells(mut self, cell: &str, count: usize) -> Self {
        self.min_cells = Some((compile_static_selector(cell), count));
        self
    }

    #[must_use]
    pub fn title(mut self, rules: Vec<FieldRule>) -> Self {
        self.title = rules;
        self
    }

    #[must_use]
    pub fn artist(mut self, rules: Vec<FieldRule>) -> Self {
        self.artist = rules;
        self
    }

    #[must_use]
    pub fn date(mut self, rules: Vec<FieldRule>) -> Self {
        self.date = rules;
        self
    }

    #[must_use]
    pub fn link(mut self, rules: Vec<FieldRule>) -> Self {
        self.link = rules;
        self
    }

    fn matching_rows<'a>(&'a self, document: &'a Html) -> impl Iterator<Item = ElementRef<'a>> {
        document.select(&self.rows).filter(|row| {
            self.min_cells
                .as_ref()
                .is_none_or(|(cell, count)| row.select(cell).count() >= *count)
        })
    }

    fn read(&self, row: ElementRef<'_>, base: Option<&Url>) -> ExtractedRow {
        ExtractedRow {
            title: first_match(&self.title, row),
            artist: first_match(&self.artist, row),
            date: first_match(&self.date, row),
            link: first_match(&self.link, row).map(|href| absolutize(&href, base)),
        }
    }
}

/// Reads a listing with the first layout that matches any row.
///
/// Returns an empty list when no layout matches.
#[must_use]
pub fn extract_rows(html: &str, layouts: &[RowLayout], base_url: &str) -> Vec<ExtractedRow> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();
    layouts
        .iter()
        .map(|layout| {
            layout
                .matching_rows(&document)
                .map(|row| layout.read(row, base.as_ref()))
                .collect::<Vec<_>>()
        })
        .find(|rows| !rows.is_empty())
        .unwrap_or_default()
}

/// Text and first link of an HTML fragment such as a JSON table cell.
#[must_use]
pub fn fragment_text_and_link(fragment: &str) -> (String, Option<String>) {
    static LINK: std::sync::LazyLock<Selector> =
        std::sync::LazyLock::new(|| compile_static_selector("a"));

    let html = Html::parse_fragment(fragment);
    let text = collapse_whitespace(&html.root_element().text().collect::<String>());
    let link = html
        .select(&LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(non_blank);
    (text, link)
}

/// Resolves `href` against `base`, leaving it unchanged when it cannot be joined.
#[must_use]
pub fn absolutize(href: &str, base: Option<&Url>) -> String {
    base.and_then(|base| base.join(href).ok())
        .map_or_else(|| href.to_string(), |url| url.to_string())
}
