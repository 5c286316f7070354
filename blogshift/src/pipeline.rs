//! The two runs: acquisition (discover, extract, publish) and enhancement
//! (search, scrape references, rewrite, publish).

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::dates::is_real_date;
use crate::discover::Discoverer;
use crate::extract::{ContentExtractor, ExtractionError};
use crate::llm::enhancer::{EnhanceError, Enhancer};
use crate::publish::{PublishOutcome, Publisher};
use crate::reference::{ReferenceArticle, ReferenceScraper};
use crate::search::{ReferenceSearcher, SearchError};
use crate::storage::{ArticleFilter, ArticleRecord, StorageError};
use crate::throttle::{Clock, Throttle};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("storage unavailable: {0}")]
    Storage(#[from] StorageError),
}

/// Why one article could not be processed. Never aborts the run.
#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("{0}")]
    Search(#[from] SearchError),
    #[error("none of {0} reference(s) could be scraped")]
    NoReferenceContent(usize),
    #[error("enhancement failed: {0}")]
    Enhance(#[from] EnhanceError),
    #[error("could not save article: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionFailure {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct AcquisitionReport {
    /// Candidates selected by discovery.
    pub discovered: usize,
    pub used_fallback: bool,
    /// Ids of the records created.
    pub saved: Vec<i64>,
    pub failures: Vec<AcquisitionFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnhancementOutcome {
    Published { enhanced_id: i64 },
    Skipped { existing_id: i64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticleOutcome {
    pub article_id: i64,
    pub title: String,
    #[serde(flatten)]
    pub outcome: EnhancementOutcome,
}

pub struct AcquisitionPipeline {
    discoverer: Discoverer,
    extractor: ContentExtractor,
    publisher: Arc<Publisher>,
    clock: Arc<dyn Clock>,
    delay: Duration,
}

impl AcquisitionPipeline {
    pub fn new(
        discoverer: Discoverer,
        extractor: ContentExtractor,
        publisher: Arc<Publisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            discoverer,
            extractor,
            publisher,
            clock,
            delay: Duration::ZERO,
        }
    }

    /// Politeness delay between consecutive article fetches.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Discover the `count` oldest articles, extract each one and store it.
    pub async fn run_acquisition(&self, count: usize) -> AcquisitionReport {
        let discovery = self.discoverer.discover(count).await;
        let mut report = AcquisitionReport {
            discovered: discovery.candidates.len(),
            used_fallback: discovery.used_fallback,
            ..AcquisitionReport::default()
        };
        info!(
            "acquire: {} unique article(s) found, processing {}",
            discovery.unique_found, report.discovered
        );

        let mut throttle = Throttle::new(self.clock.clone(), self.delay);
        for candidate in discovery.candidates {
            throttle.wait().await;
            let url = candidate.link.url.clone();
            info!("acquire: processing '{}' ({})", candidate.title, candidate.date);

            let listing_date = Some(candidate.date).filter(|d| is_real_date(*d));
            match self.acquire_one(&url, listing_date).await {
                Ok(record) => report.saved.push(record.id),
                Err(e) => {
                    warn!("acquire: skipping {}: {}", url, e);
                    report.failures.push(AcquisitionFailure {
                        url,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "acquire: saved {} article(s), {} failure(s)",
            report.saved.len(),
            report.failures.len()
        );
        report
    }

    async fn acquire_one(&self, url: &str, listing_date: Option<NaiveDate>) -> Result<ArticleRecord, ArticleError> {
        let article = self.extractor.extract(url).await?;
        Ok(self.publisher.publish_original(article, listing_date).await?)
    }
}

pub struct EnhancementPipeline {
    searcher: ReferenceSearcher,
    scraper: ReferenceScraper,
    enhancer: Enhancer,
    publisher: Arc<Publisher>,
    clock: Arc<dyn Clock>,
    article_delay: Duration,
    reference_delay: Duration,
}

impl EnhancementPipeline {
    pub fn new(
        searcher: ReferenceSearcher,
        scraper: ReferenceScraper,
        enhancer: Enhancer,
        publisher: Arc<Publisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            searcher,
            scraper,
            enhancer,
            publisher,
            clock,
            article_delay: Duration::ZERO,
            reference_delay: Duration::ZERO,
        }
    }

    pub fn with_delays(mut self, article_delay: Duration, reference_delay: Duration) -> Self {
        self.article_delay = article_delay;
        self.reference_delay = reference_delay;
        self
    }

    /// Enhance up to `limit` stored originals that have no enhanced version yet.
    ///
    /// Failures of a single article are reported in its outcome; only failing to read the
    /// article list aborts the run.
    pub async fn run_enhancement(&self, limit: Option<usize>) -> Result<Vec<ArticleOutcome>, PipelineError> {
        let originals = self.publisher.store().list(ArticleFilter::originals()).await?;
        info!("enhance: {} original article(s) stored", originals.len());

        let mut pending = Vec::new();
        for article in originals {
            if let Some(existing_id) = self.publisher.already_enhanced(&article).await? {
                debug!("enhance: '{}' already enhanced as {}", article.title, existing_id);
                continue;
            }
            pending.push(article);
        }
        if let Some(limit) = limit {
            pending.truncate(limit);
        }
        info!("enhance: {} article(s) to process", pending.len());

        let mut throttle = Throttle::new(self.clock.clone(), self.article_delay);
        let mut outcomes = Vec::with_capacity(pending.len());
        for (i, article) in pending.into_iter().enumerate() {
            throttle.wait().await;
            info!("enhance: [{}] '{}'", i + 1, article.title);

            let outcome = match self.enhance_one(&article).await {
                Ok(PublishOutcome::Published(record)) => EnhancementOutcome::Published {
                    enhanced_id: record.id,
                },
                Ok(PublishOutcome::Skipped { existing_id }) => EnhancementOutcome::Skipped { existing_id },
                Err(e) => {
                    error!("enhance: '{}' failed: {}", article.title, e);
                    EnhancementOutcome::Failed { reason: e.to_string() }
                }
            };
            outcomes.push(ArticleOutcome {
                article_id: article.id,
                title: article.title,
                outcome,
            });
        }
        Ok(outcomes)
    }

    async fn enhance_one(&self, article: &ArticleRecord) -> Result<PublishOutcome, ArticleError> {
        let hits = self.searcher.find_references(&article.title).await?;

        let mut throttle = Throttle::new(self.clock.clone(), self.reference_delay);
        let mut references: Vec<ReferenceArticle> = Vec::with_capacity(hits.len());
        for hit in &hits {
            throttle.wait().await;
            match self.scraper.scrape(hit).await {
                Ok(reference) => references.push(reference),
                Err(e) => warn!("enhance: reference {} unusable: {}", hit.url, e),
            }
        }
        if references.is_empty() {
            return Err(ArticleError::NoReferenceContent(hits.len()));
        }

        let rewritten = self
            .enhancer
            .enhance(&article.title, &article.content, &references)
            .await?;
        Ok(self
            .publisher
            .publish_enhanced(article, &rewritten, &references)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{LinkClassifier, SiteProfile};
    use crate::fetch::StaticFetcher;
    use crate::llm::{LlmProvider, LlmRequest, LlmResponse, UsageMetadata};
    use crate::storage::{ArticleStore, SqliteArticleStore};
    use crate::throttle::ManualClock;
    use common::SiteConfig;

    struct Canned;

    #[async_trait::async_trait]
    impl LlmProvider for Canned {
        async fn generate(&self, _request: LlmRequest) -> anyhow::Result<LlmResponse> {
            Ok(LlmResponse {
                content: "A sharper rewrite.".to_string(),
                usage: UsageMetadata::default(),
                model: "canned".to_string(),
            })
        }
    }

    const ARTICLE_BODY: &str = "Customer support teams are adopting conversational assistants \
        to answer routine questions around the clock, which frees agents for harder cases.";

    fn listing() -> String {
        r#"<html><body>
            <article><h2><a href="/blogs/first-post/">Why Chatbots Help Support</a></h2>
              <time datetime="2024-02-10">Feb 10, 2024</time></article>
            <article><h2><a href="/blogs/second-post/">Older Thoughts On Automation</a></h2>
              <time datetime="2023-11-02">Nov 2, 2023</time></article>
        </body></html>"#
            .to_string()
    }

    fn article(title: &str) -> String {
        format!(
            "<html><body><article><h1>{title}</h1><div class=\"entry-content\"><p>{ARTICLE_BODY}</p></div></article></body></html>"
        )
    }

    fn classifier() -> Arc<LinkClassifier> {
        let profile = SiteProfile::from_config(&SiteConfig::default()).unwrap();
        Arc::new(LinkClassifier::new(profile))
    }

    async fn publisher() -> Arc<Publisher> {
        Arc::new(Publisher::new(Arc::new(SqliteArticleStore::in_memory().await.unwrap())))
    }

    #[tokio::test]
    async fn acquisition_saves_oldest_first_and_records_failures() {
        let fetcher = Arc::new(
            StaticFetcher::new()
                .page("https://beyondchats.com/blogs/", &listing())
                .page(
                    "https://beyondchats.com/blogs/second-post/",
                    &article("Older Thoughts On Automation"),
                ),
        );
        let clock = Arc::new(ManualClock::new());
        let classifier = classifier();
        let publisher = publisher().await;
        let pipeline = AcquisitionPipeline::new(
            Discoverer::new(fetcher.clone(), classifier.clone()),
            ContentExtractor::new(fetcher.clone(), classifier),
            publisher.clone(),
            clock.clone(),
        )
        .with_delay(Duration::from_secs(2));

        let report = pipeline.run_acquisition(5).await;
        assert_eq!(report.discovered, 2);
        assert!(!report.used_fallback);
        assert_eq!(report.saved.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].url, "https://beyondchats.com/blogs/first-post/");
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);

        let saved = publisher.store().get(report.saved[0]).await.unwrap();
        assert_eq!(saved.title, "Older Thoughts On Automation");
        assert_eq!(saved.slug, "older-thoughts-on-automation");
        assert_eq!(saved.published_date, NaiveDate::from_ymd_opt(2023, 11, 2));
    }

    fn results_page() -> String {
        r#"<html><body><div id="search">
            <div class="g"><a href="https://www.youtube.com/watch?v=1"><h3>Video</h3></a></div>
            <div class="g"><a href="https://support.example/blog/chatbots-guide"><h3>The Chatbot Guide</h3></a></div>
            <div class="g"><a href="https://dead.example/blog/gone"><h3>Gone Reference</h3></a></div>
        </div></body></html>"#
            .to_string()
    }

    async fn enhancement(fetcher: StaticFetcher, publisher: Arc<Publisher>) -> (EnhancementPipeline, Arc<ManualClock>) {
        let fetcher: Arc<StaticFetcher> = Arc::new(fetcher);
        let clock = Arc::new(ManualClock::new());
        let pipeline = EnhancementPipeline::new(
            ReferenceSearcher::new(fetcher.clone(), "https://www.google.com/search?q="),
            ReferenceScraper::new(fetcher),
            Enhancer::new(Arc::new(Canned)),
            publisher,
            clock.clone(),
        )
        .with_delays(Duration::from_secs(5), Duration::from_secs(1));
        (pipeline, clock)
    }

    async fn seed(publisher: &Publisher, title: &str) -> ArticleRecord {
        publisher
            .store()
            .create(crate::storage::NewArticle {
                title: title.to_string(),
                content: ARTICLE_BODY.to_string(),
                original_url: "https://beyondchats.com/blogs/seeded/".to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn enhancement_publishes_once_per_original() {
        let publisher = publisher().await;
        let original = seed(&publisher, "How Conversational AI Is Changing Customer Support").await;

        let reference_body = format!("<article><p>{}</p></article>", "Reference insight. ".repeat(20));
        let fetcher = StaticFetcher::new()
            .page(
                "https://www.google.com/search?q=How+Conversational+AI+Is+Changing+Customer+Support",
                &results_page(),
            )
            .page("https://support.example/blog/chatbots-guide", &reference_body);
        let (pipeline, clock) = enhancement(fetcher, publisher.clone()).await;

        let outcomes = pipeline.run_enhancement(None).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        let EnhancementOutcome::Published { enhanced_id } = outcomes[0].outcome else {
            panic!("expected publish, got {:?}", outcomes[0].outcome);
        };
        let enhanced = publisher.store().get(enhanced_id).await.unwrap();
        assert_eq!(enhanced.parent_id, Some(original.id));
        assert!(enhanced.content.starts_with("A sharper rewrite."));
        assert_eq!(enhanced.reference_urls, vec!["https://support.example/blog/chatbots-guide".to_string()]);
        // one sleep between the two reference scrapes, none before the first article
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);

        let again = pipeline.run_enhancement(None).await.unwrap();
        assert!(again.is_empty());
        assert_eq!(publisher.store().list(ArticleFilter::enhanced()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn search_failure_is_reported_per_article() {
        let publisher = publisher().await;
        seed(&publisher, "Short title").await;
        let (pipeline, _clock) = enhancement(StaticFetcher::new(), publisher.clone()).await;

        let outcomes = pipeline.run_enhancement(Some(5)).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].outcome, EnhancementOutcome::Failed { .. }));
        assert!(publisher.store().list(ArticleFilter::enhanced()).await.unwrap().is_empty());
    }
}
