//! Date normalization for heterogeneous listing text.
//!
//! Every adapter hands its raw date text here; nothing else parses dates.
//! Rules are tried in order and the first success wins:
//!
//! 1. strict ISO `YYYY-MM-DD` (an ISO datetime is cut to its date part)
//! 2. `<day> <month> <year>`, e.g. `15 Mar 2024`
//! 3. free text `<Month>[.] <day>[, <year>]`, e.g. `Sept. 5, 2024` or `Dec 20`
//!
//! A missing year is inferred from the reference date, crossing the year
//! boundary when a December listing is read in January and vice versa.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

use crate::text::compile_static_regex;

static ISO_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"^(\d{4}-\d{2}-\d{2})(?:$|[T ])"));

static MONTH_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"\b([A-Z][a-z]{2,8})\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b(?:(?:,\s*|\s+)(\d{4})\b)?",
    )
});

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Inclusive calendar window used for request parameters and final filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    /// Creates a window; bounds are swapped if given in the wrong order.
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Window of `lookback_days` before and `lookahead_days` after `as_of`.
    #[must_use]
    pub fn around(as_of: NaiveDate, lookback_days: u32, lookahead_days: u32) -> Self {
        Self::new(
            as_of - Duration::days(i64::from(lookback_days)),
            as_of + Duration::days(i64::from(lookahead_days)),
        )
    }

    #[must_use]
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Inclusive on both ends.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Normalizes raw date text into a calendar date, or `None` if no rule matches.
#[must_use]
pub fn normalize(raw: &str, as_of: NaiveDate) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    parse_iso(text)
        .or_else(|| parse_day_month_year(text))
        .or_else(|| parse_month_day(text, as_of))
}

/// Convenience wrapper for optional raw text.
#[must_use]
pub fn normalize_opt(raw: Option<&str>, as_of: NaiveDate) -> Option<NaiveDate> {
    raw.and_then(|text| normalize(text, as_of))
}

fn parse_iso(text: &str) -> Option<NaiveDate> {
    let caps = ISO_PREFIX_RE.captures(text)?;
    NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%Y-%m-%d").ok()
}

fn parse_day_month_year(text: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() != 3 || !parts[0].chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(&parts.join(" "), "%d %b %Y").ok()
}

fn parse_month_day(text: &str, as_of: NaiveDate) -> Option<NaiveDate> {
    MONTH_DAY_RE.captures_iter(text).find_map(|caps| {
        let month = expand_month(caps.get(1)?.as_str())?;
        let day = caps.get(2)?.as_str();
        let year = match caps.get(3) {
            Some(year) => year.as_str().parse::<i32>().ok()?,
            None => infer_year(month_number(month)?, as_of),
        };
        NaiveDate::parse_from_str(&format!("{month} {day} {year}"), "%B %d %Y").ok()
    })
}

/// Expands a month word (full or abbreviated, e.g. `Sept`, `Jan`) to its full name.
fn expand_month(word: &str) -> Option<&'static str> {
    if word.len() < 3 {
        return None;
    }
    let lower = word.to_ascii_lowercase();
    MONTH_NAMES
        .iter()
        .copied()
        .find(|name| name.to_ascii_lowercase().starts_with(&lower))
}

fn month_number(full_name: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .position(|name| *name == full_name)
        .and_then(|index| u32::try_from(index + 1).ok())
}

/// Picks the year for a year-less month, crossing the December/January boundary.
fn infer_year(month: u32, as_of: NaiveDate) -> i32 {
    match (as_of.month(), month) {
        (1, 12) => as_of.year() - 1,
        (12, 1) => as_of.year() + 1,
        _ => as_of.year(),
    }
}
