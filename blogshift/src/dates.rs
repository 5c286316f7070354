//! Date resolution for listing entries and article pages.

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

static MONTH_DAY_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+\s+\d{1,2},\s+\d{4})").expect("valid regex"));
static SLASHED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2}/\d{1,2}/\d{4})").expect("valid regex"));
static ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})(st|nd|rd|th)\b").expect("valid regex"));

/// Explicit formats tried after the lenient pass, in order.
const EXPLICIT_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%Y-%m-%d", "%d/%m/%Y", "%b %d %Y"];

/// Date assigned when nothing could be resolved; sorts before any real publication date.
pub fn sentinel() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

pub fn is_real_date(date: NaiveDate) -> bool {
    use chrono::Datelike;
    date.year() > 1900
}

/// Parse free-form date text into a calendar date.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    lenient(text).or_else(|| {
        EXPLICIT_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
    })
}

fn lenient(text: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.date_naive());
    }
    // ISO date, optionally followed by a time part
    if let Some(prefix) = text.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }

    let cleaned = ORDINAL.replace_all(text, "$1");
    let cleaned = cleaned.trim_end_matches('.').replace(" ,", ",");
    for fmt in ["%B %d, %Y", "%B %d %Y", "%d %B %Y", "%d %B, %Y", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, fmt) {
            return Some(date);
        }
    }
    None
}

/// Find a date-looking substring in running text: "Month Day, Year" first, then "D/M/Y".
pub fn find_date_in_text(text: &str) -> Option<&str> {
    MONTH_DAY_YEAR
        .captures(text)
        .or_else(|| SLASHED.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_common_blog_formats() {
        assert_eq!(parse_date("2024-01-05"), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_date("2024-01-05T10:00:00+05:30"), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_date("2024-02-10 08:00"), Some(ymd(2024, 2, 10)));
        assert_eq!(parse_date("March 24, 2025"), Some(ymd(2025, 3, 24)));
        assert_eq!(parse_date("Mar 24, 2025"), Some(ymd(2025, 3, 24)));
        assert_eq!(parse_date("December 1st, 2023"), Some(ymd(2023, 12, 1)));
        assert_eq!(parse_date("5 January 2024"), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_date("Tue, 1 Jul 2003 10:52:37 +0200"), Some(ymd(2003, 7, 1)));
    }

    #[test]
    fn slashed_dates_are_us_first_then_day_first() {
        assert_eq!(parse_date("01/05/2024"), Some(ymd(2024, 1, 5)));
        // Not a valid month in M/D/Y, so the explicit D/M/Y format applies
        assert_eq!(parse_date("25/12/2023"), Some(ymd(2023, 12, 25)));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("yesterday-ish"), None);
        assert_eq!(parse_date("5 min read"), None);
    }

    #[test]
    fn sentinel_is_not_real() {
        assert!(!is_real_date(sentinel()));
        assert!(is_real_date(ymd(2001, 1, 1)));
        assert!(sentinel() < ymd(1970, 1, 1));
    }

    #[test]
    fn finds_dates_in_running_text() {
        assert_eq!(
            find_date_in_text("By Jane · Published March 24, 2025 · 5 min"),
            Some("March 24, 2025")
        );
        assert_eq!(find_date_in_text("Posted 12/03/2024 by admin"), Some("12/03/2024"));
        assert_eq!(find_date_in_text("No date here"), None);
    }
}
