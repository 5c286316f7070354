//! Pulling readable text out of competing articles found by search.

use scraper::Html;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::dom::{self, Cascade, ValueSource};
use crate::extract::ExtractionError;
use crate::fetch::Fetch;
use crate::search::SearchHit;

const CONTENT_SELECTORS: &[&str] = &[
    "article",
    ".entry-content",
    ".post-content",
    ".article-content",
    ".content",
    "main",
    "[role=\"main\"]",
    ".post-body",
    ".article-body",
];
const MIN_CONTENT_LEN: usize = 200;
const MIN_PARAGRAPH_LEN: usize = 20;
pub const DEFAULT_MAX_CHARS: usize = 5000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceArticle {
    pub title: String,
    pub url: String,
    pub content: String,
}

pub struct ReferenceScraper {
    fetcher: Arc<dyn Fetch>,
    contents: Cascade,
    max_chars: usize,
}

impl ReferenceScraper {
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        let contents = Cascade::new().rules(CONTENT_SELECTORS, ValueSource::Readable, |t: &str| {
            t.chars().count() > MIN_CONTENT_LEN
        });
        Self {
            fetcher,
            contents,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub async fn scrape(&self, hit: &SearchHit) -> Result<ReferenceArticle, ExtractionError> {
        let html = self.fetcher.fetch(&hit.url).await?;
        let content = self.content_from_html(&html);
        if content.is_empty() {
            return Err(ExtractionError::EmptyContent(hit.url.clone()));
        }
        info!("reference: scraped {} chars from {}", content.chars().count(), hit.url);
        Ok(ReferenceArticle {
            title: hit.title.clone(),
            url: hit.url.clone(),
            content,
        })
    }

    /// Main text of a page with navigation and ads removed, truncated to `max_chars`.
    pub fn content_from_html(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        let text = match self.contents.matched_in(document.root_element()) {
            Some((css, text)) => {
                debug!("reference: content from '{}'", css);
                text
            }
            None => readable_paragraphs(&document),
        };
        truncate_chars(&text, self.max_chars)
    }
}

fn readable_paragraphs(document: &Html) -> String {
    let Some(sel) = dom::selector("p") else {
        return String::new();
    };
    document
        .select(&sel)
        .filter(|p| !dom::inside_chrome(*p))
        .map(dom::inline_text)
        .filter(|t| t.chars().count() > MIN_PARAGRAPH_LEN)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Cut to at most `max` characters, marking the cut with "...".
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.to_string(),
    }
}
