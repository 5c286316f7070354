//! Listing-page discovery: walk the paginated blog index and collect candidate articles.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::classify::{LinkClassifier, MIN_ANCHOR_TITLE_LEN};
use crate::dates::{find_date_in_text, is_real_date, parse_date, sentinel};
use crate::dom::{self, Cascade, ValueSource};
use crate::fetch::Fetch;
use crate::rank::{select_oldest, Dated};

/// Article-like ancestors; the nearest one around an anchor is its container.
const CONTAINERS: &[&str] = &["article", ".post", ".blog-post", ".entry", "[class*=\"blog\"]"];
const PAGINATION_LINKS: &str = "a[href*=\"page/\"], .pagination a, .page-numbers a";
const DATE_LABELS: &[&str] = &["time", ".date", ".published-date", ".post-date", "[class*=\"date\"]"];

static PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"page/(\d+)").expect("valid regex"));

/// An anchor that looks like an article link, before it is confirmed by extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateLink {
    pub url: String,
    pub anchor_text: String,
    /// Tag and class of the article-like container the anchor sits in, if any.
    pub container_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingCandidate {
    pub link: CandidateLink,
    pub title: String,
    /// Listing date, or the sentinel when none could be resolved.
    pub date: NaiveDate,
    pub date_text: Option<String>,
}

impl ListingCandidate {
    pub fn has_real_date(&self) -> bool {
        is_real_date(self.date)
    }
}

impl Dated for ListingCandidate {
    fn url(&self) -> &str {
        &self.link.url
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    /// Oldest-first selection, at most `count` long, no duplicate URLs.
    pub candidates: Vec<ListingCandidate>,
    /// Unique candidates seen before truncation.
    pub unique_found: usize,
    pub last_page: u32,
    pub pages_visited: u32,
    pub failed_pages: Vec<String>,
    pub used_fallback: bool,
}

pub struct Discoverer {
    fetcher: Arc<dyn Fetch>,
    classifier: Arc<LinkClassifier>,
    dates: Cascade,
}

impl Discoverer {
    pub fn new(fetcher: Arc<dyn Fetch>, classifier: Arc<LinkClassifier>) -> Self {
        let dates = Cascade::new()
            .rule("[datetime]", ValueSource::AttrOrText("datetime"), |t: &str| {
                parse_date(t).is_some()
            })
            .rules(DATE_LABELS, ValueSource::Text, |t: &str| parse_date(t).is_some());
        Self {
            fetcher,
            classifier,
            dates,
        }
    }

    /// Walk listing pages 1..=last (capped by `max_pages`) and select the `count` oldest articles.
    pub async fn discover(&self, count: usize) -> DiscoveryReport {
        let profile = self.classifier.profile();
        let mut report = DiscoveryReport::default();
        let mut found = Vec::new();

        let first_url = profile.page_url(1);
        let last_page = match self.fetcher.fetch(first_url.as_str()).await {
            Ok(html) => {
                report.pages_visited += 1;
                let (last, candidates) = {
                    let last = self.last_page_from_html(&html);
                    (last, self.candidates_from_html(&first_url, &html))
                };
                info!("discover: page 1 -> {} candidates, last page {}", candidates.len(), last);
                found.extend(candidates);
                last
            }
            Err(e) => {
                warn!("discover: could not load {} ({}), assuming a single page", first_url, e);
                report.failed_pages.push(first_url.to_string());
                1
            }
        };
        report.last_page = last_page;

        let bound = last_page.min(profile.max_pages);
        if bound < last_page {
            info!("discover: capping {} listing pages at {}", last_page, bound);
        }

        for page in 2..=bound {
            let page_url = profile.page_url(page);
            match self.fetcher.fetch(page_url.as_str()).await {
                Ok(html) => {
                    report.pages_visited += 1;
                    let candidates = self.candidates_from_html(&page_url, &html);
                    info!("discover: page {} -> {} candidates", page, candidates.len());
                    found.extend(candidates);
                }
                Err(e) => {
                    warn!("discover: skipping page {}: {}", page, e);
                    report.failed_pages.push(page_url.to_string());
                }
            }
        }

        report.unique_found = count_unique(&found);
        report.candidates = select_oldest(found, count);

        if report.candidates.is_empty() {
            warn!("discover: no candidates found, trying single-page scan");
            report.used_fallback = true;
            report.candidates = self.alternative_scan(count).await;
            report.unique_found = report.candidates.len();
        }

        for c in &report.candidates {
            debug!("discover: selected {} ({}) {}", c.title, c.date, c.link.url);
        }
        report
    }

    /// Highest page number referenced by pagination controls; 1 when none is found.
    pub fn last_page_from_html(&self, html: &str) -> u32 {
        let document = Html::parse_document(html);
        let Some(sel) = dom::selector(PAGINATION_LINKS) else {
            return 1;
        };

        let mut last = 1;
        for link in document.select(&sel) {
            if let Some(n) = link
                .value()
                .attr("href")
                .and_then(|href| PAGE_NUMBER.captures(href))
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
            {
                last = last.max(n);
            }
            if let Ok(n) = dom::inline_text(link).parse::<u32>() {
                last = last.max(n);
            }
        }
        last
    }

    /// Every qualifying article link on one listing page, in document order.
    pub fn candidates_from_html(&self, page_url: &Url, html: &str) -> Vec<ListingCandidate> {
        let document = Html::parse_document(html);
        let Some(anchors) = dom::selector("a[href]") else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for anchor in document.select(&anchors) {
            let Some(url) = anchor
                .value()
                .attr("href")
                .and_then(|href| self.classifier.resolve(page_url, href))
            else {
                continue;
            };
            if !self.classifier.is_article_url(&url) {
                continue;
            }

            let anchor_text = dom::inline_text(anchor);
            let container = dom::closest(anchor, CONTAINERS);
            let raw_title = if self.classifier.is_weak_anchor_text(&anchor_text) {
                self.heading_for(&document, anchor, container)
                    .unwrap_or_else(|| anchor_text.clone())
            } else {
                anchor_text.clone()
            };

            let Some(title) = self.classifier.clean_title(&raw_title) else {
                debug!("discover: rejected title {:?} for {}", raw_title, url);
                continue;
            };

            let date_text = container.and_then(|c| self.date_text_in(c));
            let date = date_text
                .as_deref()
                .and_then(parse_date)
                .filter(|d| is_real_date(*d))
                .unwrap_or_else(sentinel);

            out.push(ListingCandidate {
                link: CandidateLink {
                    url: url.to_string(),
                    anchor_text,
                    container_hint: container.map(describe),
                },
                title,
                date,
                date_text,
            });
        }
        out
    }

    /// Heading for an anchor whose own text is not a title: the first h2/h3 in its container,
    /// or without a container, the nearest long heading earlier in the page.
    fn heading_for(
        &self,
        document: &Html,
        anchor: ElementRef<'_>,
        container: Option<ElementRef<'_>>,
    ) -> Option<String> {
        match container {
            Some(c) => dom::first_match(c, "h2, h3")
                .map(dom::inline_text)
                .filter(|t| !t.is_empty()),
            None => dom::preceding_heading(document, anchor, MIN_ANCHOR_TITLE_LEN),
        }
    }

    /// Raw date text inside a container: a machine-readable attribute, then date-labelled
    /// elements, then a date-looking pattern anywhere in the container text.
    fn date_text_in(&self, container: ElementRef<'_>) -> Option<String> {
        self.dates.first_in(container).or_else(|| {
            let text = dom::inline_text(container);
            find_date_in_text(&text).map(str::to_string)
        })
    }

    /// Degraded discovery: one pass over the listing root, no dates, stricter titles.
    pub async fn alternative_scan(&self, count: usize) -> Vec<ListingCandidate> {
        let base = self.classifier.profile().base_url.clone();
        match self.fetcher.fetch(base.as_str()).await {
            Ok(html) => self.alternative_from_html(&base, &html, count),
            Err(e) => {
                warn!("discover: alternative scan failed: {}", e);
                Vec::new()
            }
        }
    }

    pub fn alternative_from_html(&self, page_url: &Url, html: &str, count: usize) -> Vec<ListingCandidate> {
        let document = Html::parse_document(html);
        let Some(anchors) = dom::selector("a[href]") else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for anchor in document.select(&anchors) {
            if out.len() >= count {
                break;
            }
            let Some(url) = anchor
                .value()
                .attr("href")
                .and_then(|href| self.classifier.resolve(page_url, href))
            else {
                continue;
            };
            if !self.classifier.is_article_url(&url) {
                continue;
            }

            let anchor_text = dom::inline_text(anchor);
            let container = dom::closest(anchor, CONTAINERS);
            let mut raw_title = anchor_text.clone();
            if raw_title.chars().count() < MIN_ANCHOR_TITLE_LEN {
                if let Some(heading) = container
                    .and_then(|c| dom::first_match(c, "h2, h3"))
                    .map(dom::inline_text)
                    .filter(|t| !t.is_empty())
                {
                    raw_title = heading;
                }
            }

            let Some(title) = self
                .classifier
                .clean_title(&raw_title)
                .filter(|t| t.chars().count() > MIN_ANCHOR_TITLE_LEN)
            else {
                continue;
            };
            if !seen.insert(url.to_string()) {
                continue;
            }

            out.push(ListingCandidate {
                link: CandidateLink {
                    url: url.to_string(),
                    anchor_text,
                    container_hint: container.map(describe),
                },
                title,
                date: sentinel(),
                date_text: None,
            });
        }
        out
    }
}

fn count_unique(items: &[ListingCandidate]) -> usize {
    items.iter().map(|c| c.link.url.as_str()).collect::<HashSet<_>>().len()
}

fn describe(el: ElementRef<'_>) -> String {
    match el.value().attr("class") {
        Some(class) if !class.trim().is_empty() => {
            format!("{}.{}", el.value().name(), class.split_whitespace().collect::<Vec<_>>().join("."))
        }
        _ => el.value().name().to_string(),
    }
}
