//! Finding competing articles for a title through a web search engine.

use scraper::{ElementRef, Html};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::classify::{title_case, title_from_url};
use crate::dom;
use crate::fetch::{Fetch, FetchError};

pub const DEFAULT_ENGINE_URL: &str = "https://www.google.com/search?q=";
pub const DEFAULT_MAX_REFERENCES: usize = 2;

/// Result anchor strategies, tried in order; the first one yielding anything wins.
const RESULT_SELECTORS: &[&str] = &[
    "div.g a[href^=\"http\"]",
    "div[data-ved] a[href^=\"http\"]",
    "a[href^=\"http\"]:not([href*=\"google.com\"])",
    "h3 a[href^=\"http\"]",
];
const MAX_HITS_PER_STRATEGY: usize = 10;

/// Hosts that never hold a usable reference article (matched per domain label).
const DENIED_LABELS: &[&str] = &[
    "google",
    "youtube",
    "facebook",
    "twitter",
    "linkedin",
    "instagram",
    "pinterest",
    "tiktok",
];
const DENIED_DOMAINS: &[&str] = &["x.com", "youtu.be", "t.co"];
const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx", ".zip"];

const BLOG_SIGNALS: &[&str] = &[
    "blog",
    "article",
    "/post/",
    "/posts/",
    "medium.com",
    "dev.to",
    "hashnode.com",
    "wordpress.com",
];

const SHORT_QUERY_WORDS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
}

impl SearchHit {
    pub fn looks_like_blog(&self) -> bool {
        let url = self.url.to_lowercase();
        BLOG_SIGNALS.iter().any(|signal| url.contains(signal))
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("no usable search results for '{query}' or '{retry}'")]
    NoResults { query: String, retry: String },
}

/// Query for an article title: long titles are cut to 50 characters, short ones get
/// "article blog" appended.
pub fn build_query(title: &str) -> String {
    let title = title.trim();
    if title.chars().count() > 20 {
        title.chars().take(50).collect::<String>().trim().to_string()
    } else {
        format!("{} article blog", title)
    }
}

/// Simplified retry query: the first few words of the title.
pub fn shortened_query(title: &str) -> String {
    title
        .split_whitespace()
        .take(SHORT_QUERY_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct ReferenceSearcher {
    fetcher: Arc<dyn Fetch>,
    engine_url: String,
    engine_host: Option<String>,
    max_results: usize,
}

impl ReferenceSearcher {
    pub fn new(fetcher: Arc<dyn Fetch>, engine_url: &str) -> Self {
        let engine_host = Url::parse(engine_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()));
        Self {
            fetcher,
            engine_url: engine_url.to_string(),
            engine_host,
            max_results: DEFAULT_MAX_REFERENCES,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn search_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        format!("{}{}", self.engine_url, encoded)
    }

    /// Reference candidates for an article title, retrying once with a shortened query when
    /// the first query yields nothing usable.
    pub async fn find_references(&self, title: &str) -> Result<Vec<SearchHit>, SearchError> {
        let query = build_query(title);
        match self.search(&query).await {
            Ok(hits) if !hits.is_empty() => return Ok(hits),
            Ok(_) => warn!("search: no usable results for '{}'", query),
            Err(e) => warn!("search: query '{}' failed: {}", query, e),
        }

        let retry = shortened_query(title);
        info!("search: retrying with '{}'", retry);
        let hits = self.search(&retry).await?;
        if hits.is_empty() {
            return Err(SearchError::NoResults { query, retry });
        }
        Ok(hits)
    }

    /// One query: fetch the result page and return the ranked, filtered hits (possibly none).
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        let url = self.search_url(query);
        debug!("search: GET {}", url);
        let html = self.fetcher.fetch(&url).await?;
        let hits = self.hits_from_html(&html);
        let ranked = self.rank(hits);
        info!("search: '{}' -> {} result(s)", query, ranked.len());
        Ok(ranked)
    }

    /// All usable result anchors of the first strategy that yields any.
    pub fn hits_from_html(&self, html: &str) -> Vec<SearchHit> {
        let document = Html::parse_document(html);
        for css in RESULT_SELECTORS {
            let Some(sel) = dom::selector(css) else { continue };
            let mut seen = HashSet::new();
            let mut hits = Vec::new();
            for anchor in document.select(&sel) {
                if hits.len() >= MAX_HITS_PER_STRATEGY {
                    break;
                }
                let Some(href) = anchor.value().attr("href") else { continue };
                let Ok(url) = Url::parse(href) else { continue };
                if !self.is_allowed(&url) || !seen.insert(url.to_string()) {
                    continue;
                }
                hits.push(SearchHit {
                    title: display_title(anchor, &url),
                    url: url.to_string(),
                });
            }
            if !hits.is_empty() {
                debug!("search: strategy '{}' matched {} result(s)", css, hits.len());
                return hits;
            }
        }
        Vec::new()
    }

    /// Prefer blog-like results when there are enough of them, then keep the top few.
    pub fn rank(&self, hits: Vec<SearchHit>) -> Vec<SearchHit> {
        let blogs: Vec<SearchHit> = hits.iter().filter(|h| h.looks_like_blog()).cloned().collect();
        let mut chosen = if blogs.len() >= self.max_results { blogs } else { hits };
        chosen.truncate(self.max_results);
        chosen
    }

    fn is_allowed(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str().map(str::to_lowercase) else {
            return false;
        };
        let bare = host.trim_start_matches("www.");
        if self.engine_host.as_deref() == Some(bare) {
            return false;
        }
        if host.split('.').any(|label| DENIED_LABELS.contains(&label)) {
            return false;
        }
        if DENIED_DOMAINS
            .iter()
            .any(|d| bare == *d || bare.ends_with(&format!(".{}", d)))
        {
            return false;
        }
        let path = url.path().to_lowercase();
        !DOCUMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }
}

/// Title shown for a hit: the result heading or link text, else one made up from the URL.
fn display_title(anchor: ElementRef<'_>, url: &Url) -> String {
    let text = dom::first_match(anchor, "h3")
        .map(dom::inline_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| dom::inline_text(anchor));
    let text = if text.is_empty() {
        anchor
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "div")
            .and_then(|div| dom::first_match(div, "h3"))
            .map(dom::inline_text)
            .unwrap_or_default()
    } else {
        text
    };

    if text.chars().count() >= 5 && text != "Untitled" {
        return text;
    }
    title_from_url(url).unwrap_or_else(|| {
        let host = url.host_str().unwrap_or_default();
        title_case(host.trim_start_matches("www."))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;

    fn searcher(fetcher: StaticFetcher) -> ReferenceSearcher {
        ReferenceSearcher::new(Arc::new(fetcher), DEFAULT_ENGINE_URL)
    }

    #[test]
    fn queries() {
        assert_eq!(build_query("AI chatbots"), "AI chatbots article blog");
        let long = "How Conversational AI Is Changing Customer Support For Small Clinics";
        assert_eq!(build_query(long), "How Conversational AI Is Changing Customer Support");
        assert_eq!(shortened_query(long), "How Conversational AI");
    }

    #[test]
    fn search_urls_are_encoded() {
        let s = searcher(StaticFetcher::new());
        assert_eq!(
            s.search_url("AI & chatbots"),
            "https://www.google.com/search?q=AI+%26+chatbots"
        );
    }

    #[test]
    fn first_strategy_with_results_wins_and_filters_apply() {
        let html = r#"
          <div class="g"><a href="https://www.youtube.com/watch?v=1"><h3>A video</h3></a></div>
          <div class="g"><a href="https://example.org/blog/chatbots-guide"><h3>The Chatbot Guide</h3><cite>example.org</cite></a></div>
          <div class="g"><a href="https://example.org/blog/chatbots-guide">dup</a></div>
          <div class="g"><a href="https://docs.example.com/whitepaper.pdf">PDF</a></div>
          <div class="g"><a href="https://news.example.net/2024/support-trends">Go</a></div>
          <a href="https://other.example.com/ignored-because-strategy-one-hit">Other</a>"#;
        let hits = searcher(StaticFetcher::new()).hits_from_html(html);
        assert_eq!(
            hits,
            vec![
                SearchHit {
                    url: "https://example.org/blog/chatbots-guide".into(),
                    title: "The Chatbot Guide".into()
                },
                SearchHit {
                    url: "https://news.example.net/2024/support-trends".into(),
                    title: "Support Trends".into()
                },
            ]
        );
    }

    #[test]
    fn later_strategy_used_when_earlier_ones_find_nothing() {
        let html = r#"<p><a href="https://www.google.com/preferences">Settings</a>
                      <a href="https://smallbiz.example.com/">Small business tips</a></p>"#;
        let hits = searcher(StaticFetcher::new()).hits_from_html(html);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Small business tips");
    }

    #[test]
    fn blog_results_are_preferred_only_when_there_are_enough() {
        let s = searcher(StaticFetcher::new());
        let hit = |u: &str| SearchHit { url: u.into(), title: "t".into() };
        let mixed = vec![
            hit("https://a.com/news/1"),
            hit("https://b.com/blog/2"),
            hit("https://c.com/x"),
            hit("https://medium.com/@d/3"),
        ];
        let ranked = s.rank(mixed);
        assert_eq!(ranked[0].url, "https://b.com/blog/2");
        assert_eq!(ranked[1].url, "https://medium.com/@d/3");

        let one_blog = vec![hit("https://a.com/news/1"), hit("https://b.com/blog/2"), hit("https://c.com/x")];
        let ranked = s.rank(one_blog);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].url, "https://a.com/news/1");
    }

    #[test]
    fn hostname_title_when_url_has_no_path() {
        let html = r#"<div class="g"><a href="https://www.helpdesk.example/">Go</a></div>"#;
        let hits = searcher(StaticFetcher::new()).hits_from_html(html);
        assert_eq!(hits[0].title, "Helpdesk.example");
    }

    #[tokio::test]
    async fn social_only_results_trigger_shortened_retry() {
        let title = "Why Every Clinic Needs A Support Chatbot";
        let s0 = searcher(StaticFetcher::new());
        let first_url = s0.search_url(&build_query(title));
        let retry_url = s0.search_url(&shortened_query(title));

        let social = r#"<div class="g"><a href="https://www.facebook.com/clinic">Clinic</a></div>
                        <div class="g"><a href="https://www.youtube.com/watch?v=9">Video</a></div>
                        <div class="g"><a href="https://x.com/clinic/status/1">Post on X</a></div>"#;
        let good = r#"<div class="g"><a href="https://care.example.com/blog/clinic-chatbots">Clinic chatbots explained</a></div>"#;

        let fetcher = Arc::new(
            StaticFetcher::new()
                .page(&first_url, social)
                .page(&retry_url, good),
        );
        let s = ReferenceSearcher::new(fetcher.clone(), DEFAULT_ENGINE_URL);

        assert!(s.search(&build_query(title)).await.unwrap().is_empty());
        let hits = s.find_references(title).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://care.example.com/blog/clinic-chatbots");
        assert_eq!(fetcher.requests(), vec![first_url.clone(), first_url, retry_url]);
    }

    #[tokio::test]
    async fn no_results_after_retry_is_an_error() {
        let s = searcher(StaticFetcher::new());
        let err = s.find_references("Nothing Anywhere At All Today").await.unwrap_err();
        // Both pages 404 in the canned fetcher, so the retry surfaces the fetch failure
        assert!(matches!(err, SearchError::Fetch(_)));

        let title = "Obscure";
        let probe = searcher(StaticFetcher::new());
        let fetcher = StaticFetcher::new()
            .page(&probe.search_url(&build_query(title)), "<p>nothing</p>")
            .page(&probe.search_url(&shortened_query(title)), "<p>nothing</p>");
        let err = searcher(fetcher).find_references(title).await.unwrap_err();
        assert!(matches!(err, SearchError::NoResults { .. }));
    }
}
