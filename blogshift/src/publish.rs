//! Persisting acquired articles and their enhanced derivatives.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::dates::is_real_date;
use crate::extract::ExtractedArticle;
use crate::reference::ReferenceArticle;
use crate::slug::slugify;
use crate::storage::{unique_slug, ArticleRecord, ArticleStore, NewArticle, StorageError};

pub const ENHANCED_MARKER: &str = " (Enhanced)";
const REFERENCES_HEADING: &str = "\n\n---\n\n## References\n\n";
const UNTITLED: &str = "Untitled";
const MIN_LINK_TITLE_LEN: usize = 5;

/// Result of an enhancement publish attempt.
#[derive(Debug)]
pub enum PublishOutcome {
    Published(ArticleRecord),
    /// The original already had an enhanced child; nothing was written.
    Skipped { existing_id: i64 },
}

pub struct Publisher {
    store: Arc<dyn ArticleStore>,
}

impl Publisher {
    pub fn new(store: Arc<dyn ArticleStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ArticleStore> {
        &self.store
    }

    /// Store a freshly acquired article. The article's own date wins unless it is missing
    /// or the sentinel, in which case the listing date is used.
    pub async fn publish_original(
        &self,
        article: ExtractedArticle,
        listing_date: Option<NaiveDate>,
    ) -> Result<ArticleRecord, StorageError> {
        let published_date = article
            .published_date
            .filter(|d| is_real_date(*d))
            .or_else(|| listing_date.filter(|d| is_real_date(*d)));
        let slug = unique_slug(self.store.as_ref(), &slugify(&article.title)).await?;

        let record = self
            .store
            .create(NewArticle {
                title: article.title,
                content: article.content,
                author: article.author,
                published_date,
                slug: Some(slug),
                original_url: article.source_url,
                is_enhanced: false,
                parent_id: None,
                reference_urls: Vec::new(),
            })
            .await?;
        info!("publish: saved '{}' as {} ({})", record.title, record.id, record.slug);
        Ok(record)
    }

    /// Id of the enhanced child of `original`, if it has one.
    pub async fn already_enhanced(&self, original: &ArticleRecord) -> Result<Option<i64>, StorageError> {
        Ok(self
            .store
            .find_enhanced_child(original.id)
            .await?
            .map(|child| child.id))
    }

    /// Store the enhanced rewrite of `original`, linked to it, unless one already exists.
    pub async fn publish_enhanced(
        &self,
        original: &ArticleRecord,
        rewritten: &str,
        references: &[ReferenceArticle],
    ) -> Result<PublishOutcome, StorageError> {
        if let Some(existing_id) = self.already_enhanced(original).await? {
            warn!(
                "publish: '{}' already has enhanced version {}, skipping",
                original.title, existing_id
            );
            return Ok(PublishOutcome::Skipped { existing_id });
        }

        let title = format!("{}{}", original.title, ENHANCED_MARKER);
        let slug = unique_slug(self.store.as_ref(), &slugify(&title)).await?;
        let published_date = original
            .published_date
            .unwrap_or_else(|| Utc::now().date_naive());

        let record = self
            .store
            .create(NewArticle {
                title,
                content: with_references(rewritten, references),
                author: original.author.clone(),
                published_date: Some(published_date),
                slug: Some(slug),
                original_url: original.original_url.clone(),
                is_enhanced: true,
                parent_id: Some(original.id),
                reference_urls: references.iter().map(|r| r.url.clone()).collect(),
            })
            .await?;
        info!(
            "publish: enhanced '{}' saved as {} ({})",
            original.title, record.id, record.slug
        );
        Ok(PublishOutcome::Published(record))
    }
}

/// Rewritten body followed by a numbered markdown list of the references.
pub fn with_references(body: &str, references: &[ReferenceArticle]) -> String {
    let list = references
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. [{}]({})", i + 1, link_text(r), r.url))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}{}{}", body, REFERENCES_HEADING, list)
}

fn link_text(reference: &ReferenceArticle) -> &str {
    let title = reference.title.trim();
    if title != UNTITLED && title.chars().count() > MIN_LINK_TITLE_LEN {
        title
    } else {
        &reference.url
    }
}
