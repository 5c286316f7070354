//! Best-effort structured extraction of a single article page.

use chrono::NaiveDate;
use scraper::Html;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::classify::{title_from_url, LinkClassifier};
use crate::dates::{is_real_date, parse_date};
use crate::dom::{self, Cascade, ValueSource};
use crate::fetch::{Fetch, FetchError};
use crate::jsonld;

pub const PLACEHOLDER_TITLE: &str = "Untitled Article";

const TITLE_SELECTORS: &[&str] = &[
    "article h1",
    "main h1",
    ".post h1",
    ".entry h1",
    ".article-header h1",
    ".post-header h1",
    "h1.entry-title",
    "h1.post-title",
    "h1.article-title",
    ".entry-title",
    ".post-title",
    ".article-title",
    "h1",
];
const NAV_LABELS: &[&str] = &["home", "blog", "about", "contact"];
const TITLE_CONTAINERS: &str = "article, .post, .entry, main";

const CONTENT_SELECTORS: &[&str] = &[
    ".entry-content",
    ".post-content",
    ".article-content",
    "article",
    ".content",
    "main",
    "[class*=\"content\"]",
];
const MIN_CONTENT_LEN: usize = 100;

const AUTHOR_SELECTORS: &[&str] = &[".author", ".by-author", "[class*=\"author\"]", "[rel=\"author\"]"];
const MAX_AUTHOR_LEN: usize = 80;

const DATE_SELECTORS: &[&str] = &["time", ".published-date", "[class*=\"date\"]", "[datetime]"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedArticle {
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub source_url: String,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("no article content found at {0}")]
    EmptyContent(String),
}

pub struct ContentExtractor {
    fetcher: Arc<dyn Fetch>,
    classifier: Arc<LinkClassifier>,
    titles: Cascade,
    contents: Cascade,
    authors: Cascade,
    dates: Cascade,
}

impl ContentExtractor {
    pub fn new(fetcher: Arc<dyn Fetch>, classifier: Arc<LinkClassifier>) -> Self {
        let brand = classifier.profile().brand.to_lowercase();
        let titles = Cascade::new().rules(TITLE_SELECTORS, ValueSource::Text, move |t: &str| {
            let lower = t.to_lowercase();
            lower != brand && t.chars().count() > 5 && !NAV_LABELS.contains(&lower.as_str())
        });
        let contents = Cascade::new().rules(CONTENT_SELECTORS, ValueSource::Block, |t: &str| {
            t.chars().count() > MIN_CONTENT_LEN
        });
        let authors = Cascade::new().rules(AUTHOR_SELECTORS, ValueSource::Text, |t: &str| {
            t.chars().count() <= MAX_AUTHOR_LEN
        });
        let dates = Cascade::new().rules(DATE_SELECTORS, ValueSource::AttrOrText("datetime"), |t: &str| {
            parse_date(t).is_some()
        });

        Self {
            fetcher,
            classifier,
            titles,
            contents,
            authors,
            dates,
        }
    }

    /// Fetch `url` and extract it. Only a failed fetch or a page with no text at all is an error.
    pub async fn extract(&self, url: &str) -> Result<ExtractedArticle, ExtractionError> {
        let html = self.fetcher.fetch(url).await?;
        self.extract_from_html(url, &html)
    }

    pub fn extract_from_html(&self, url: &str, html: &str) -> Result<ExtractedArticle, ExtractionError> {
        let document = Html::parse_document(html);

        let title = self.title(&document, url);
        let content = self.content(&document);
        if content.is_empty() {
            return Err(ExtractionError::EmptyContent(url.to_string()));
        }
        let author = self.author(&document);
        let published_date = self.published_date(&document);

        debug!(
            "extract: {} -> title={:?} chars={} author={:?} date={:?}",
            url,
            title,
            content.chars().count(),
            author,
            published_date
        );

        Ok(ExtractedArticle {
            title,
            content,
            author,
            published_date,
            source_url: url.to_string(),
        })
    }

    fn title(&self, document: &Html, url: &str) -> String {
        let raw = self.titles.first_in_document(document).or_else(|| {
            // Only the site name (or nothing) was found: look for a heading inside the content
            let container = dom::selector(TITLE_CONTAINERS)
                .and_then(|sel| document.select(&sel).next())?;
            dom::first_match(container, "h1, h2")
                .map(dom::inline_text)
                .filter(|t| !t.is_empty())
        });

        raw.and_then(|t| self.classifier.clean_title(&t))
            .or_else(|| {
                Url::parse(url)
                    .ok()
                    .and_then(|u| title_from_url(&u))
                    .and_then(|t| self.classifier.clean_title(&t))
            })
            .unwrap_or_else(|| PLACEHOLDER_TITLE.to_string())
    }

    fn content(&self, document: &Html) -> String {
        if let Some((css, text)) = self.contents.matched_in(document.root_element()) {
            debug!("extract: content from '{}'", css);
            return text;
        }
        paragraph_text(document, 0)
    }

    fn author(&self, document: &Html) -> Option<String> {
        if let Some(author) = jsonld::extract_authors(document).into_iter().next() {
            return Some(author);
        }
        self.authors
            .first_in_document(document)
            .map(|a| strip_by_prefix(&a))
            .filter(|a| !a.is_empty())
    }

    fn published_date(&self, document: &Html) -> Option<NaiveDate> {
        jsonld::extract_date_published(document)
            .and_then(|d| parse_date(&d))
            .or_else(|| self.dates.first_in_document(document).and_then(|d| parse_date(&d)))
            .filter(|d| is_real_date(*d))
    }
}

/// All `<p>` texts longer than `min_len` characters, separated by blank lines.
pub fn paragraph_text(document: &Html, min_len: usize) -> String {
    let Some(sel) = dom::selector("p") else {
        return String::new();
    };
    document
        .select(&sel)
        .map(dom::inline_text)
        .filter(|p| !p.is_empty() && p.chars().count() > min_len)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn strip_by_prefix(author: &str) -> String {
    let trimmed = author.trim();
    let lower = trimmed.to_lowercase();
    if lower.starts_with("by ") {
        trimmed[3..].trim().to_string()
    } else {
        trimmed.to_string()
    }
}
