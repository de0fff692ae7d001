//! Date heuristics for the `Date` and `Received` headers, and IMAP `INTERNALDATE`.

use chrono::{DateTime, FixedOffset};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref COMMENT: Regex = Regex::new(r"\([^)]*\)").unwrap();
    static ref SPACES: Regex = Regex::new(r"\s+").unwrap();
    /// `[Tue, ]1 Jul 2003 10:52:37 +0200`, the shape found after the `;` of a `Received` header.
    static ref RECEIVED_DATE: Regex = Regex::new(
        r"(?:[A-Za-z]{3},\s*)?\d{1,2}\s+[A-Za-z]{3}\s+\d{4}\s+\d{1,2}:\d{2}(?::\d{2})?\s+(?:[+-]\d{4}|[A-Z]{1,5})"
    )
    .unwrap();
}

const FALLBACK_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z",
    "%a, %d %b %Y %H:%M %z",
    "%d %b %Y %H:%M %z",
    "%a, %d %b %y %H:%M:%S %z",
    "%d %b %y %H:%M:%S %z",
    "%d-%b-%Y %H:%M:%S %z",
];

/// Parses an RFC 2822 date, tolerating comments, odd spacing, and a few common deviations.
pub fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let cleaned = COMMENT.replace_all(raw, " ");
    let cleaned = SPACES.replace_all(cleaned.trim(), " ");
    if let Ok(date) = DateTime::parse_from_rfc2822(&cleaned) {
        return Some(date);
    }
    FALLBACK_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&cleaned, fmt).ok())
}

/// Finds the last date-shaped text in the given `Received` values.
pub fn from_received<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<DateTime<FixedOffset>> {
    values
        .into_iter()
        .flat_map(|value| RECEIVED_DATE.find_iter(value))
        .filter_map(|m| parse_date(m.as_str()))
        .last()
}

/// Parses an IMAP `INTERNALDATE`, e.g. `17-Jul-1996 02:44:25 -0700`.
pub fn parse_internal_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw.trim(), "%d-%b-%Y %H:%M:%S %z").ok()
}
