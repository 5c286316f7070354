//! Dedup and oldest-first selection over discovered or extracted items.

use chrono::NaiveDate;
use std::collections::HashSet;

use crate::dates::is_real_date;

/// Anything with a source URL and a (possibly sentinel) date.
pub trait Dated {
    fn url(&self) -> &str;
    fn date(&self) -> NaiveDate;
}

/// Drop exact-URL duplicates, keeping the first occurrence.
pub fn dedup_by_url<T: Dated>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.url().to_string()))
        .collect()
}

/// Select the `count` oldest items.
///
/// When any item has a real date only the dated items are considered, sorted ascending
/// (stable, so ties keep discovery order). Otherwise every item carries the sentinel and the
/// selection is simply the first `count` in discovery order.
pub fn select_oldest<T: Dated>(items: Vec<T>, count: usize) -> Vec<T> {
    let (mut dated, undated): (Vec<T>, Vec<T>) = dedup_by_url(items)
        .into_iter()
        .partition(|item| is_real_date(item.date()));

    let mut picked = if dated.is_empty() {
        undated
    } else {
        dated.sort_by_key(|item| item.date());
        dated
    };
    picked.truncate(count);
    picked
}
