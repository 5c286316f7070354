//! Article persistence: the storage contract the pipeline reads from and publishes to,
//! and its SQLite implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::debug;

use crate::slug::{slugify, with_suffix};

const MAX_TITLE_LEN: usize = 255;
const MAX_AUTHOR_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid article: {0}")]
    Validation(String),
    #[error("slug '{0}' is already taken")]
    SlugTaken(String),
    #[error("article {0} not found")]
    NotFound(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A persisted article. `is_enhanced` is true exactly when `parent_id` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleRecord {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub slug: String,
    pub original_url: String,
    pub is_enhanced: bool,
    pub parent_id: Option<i64>,
    pub reference_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new record. An omitted slug is derived from the title and made unique.
#[derive(Debug, Clone, Default)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub slug: Option<String>,
    pub original_url: String,
    pub is_enhanced: bool,
    pub parent_id: Option<i64>,
    pub reference_urls: Vec<String>,
}

/// Partial update; `None` leaves a field unchanged. `parent_id` also sets `is_enhanced`.
#[derive(Debug, Clone, Default)]
pub struct ArticleUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<Option<String>>,
    pub published_date: Option<Option<NaiveDate>>,
    pub slug: Option<String>,
    pub original_url: Option<String>,
    pub parent_id: Option<Option<i64>>,
    pub reference_urls: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArticleFilter {
    pub enhanced: Option<bool>,
}

impl ArticleFilter {
    pub fn all() -> Self {
        Self { enhanced: None }
    }

    pub fn originals() -> Self {
        Self {
            enhanced: Some(false),
        }
    }

    pub fn enhanced() -> Self {
        Self {
            enhanced: Some(true),
        }
    }
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Records matching `filter`, newest published first, then newest created first.
    async fn list(&self, filter: ArticleFilter) -> Result<Vec<ArticleRecord>, StorageError>;
    /// The newest non-enhanced record by published date, then creation time.
    async fn latest_original(&self) -> Result<Option<ArticleRecord>, StorageError>;
    async fn get(&self, id: i64) -> Result<ArticleRecord, StorageError>;
    async fn create(&self, article: NewArticle) -> Result<ArticleRecord, StorageError>;
    async fn update(&self, id: i64, changes: ArticleUpdate) -> Result<ArticleRecord, StorageError>;
    async fn delete(&self, id: i64) -> Result<(), StorageError>;
    async fn slug_exists(&self, slug: &str) -> Result<bool, StorageError>;
    /// The enhanced derivative of `parent_id`, if one was published.
    async fn find_enhanced_child(&self, parent_id: i64) -> Result<Option<ArticleRecord>, StorageError>;
}

/// First of `base`, `base-1`, `base-2`, ... not yet used by any record.
pub async fn unique_slug(store: &dyn ArticleStore, base: &str) -> Result<String, StorageError> {
    let mut n = 0;
    loop {
        let candidate = with_suffix(base, n);
        if !store.slug_exists(&candidate).await? {
            if n > 0 {
                debug!("storage: slug '{}' taken, using '{}'", base, candidate);
            }
            return Ok(candidate);
        }
        n += 1;
    }
}

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    title: String,
    content: String,
    author: Option<String>,
    published_date: Option<String>,
    slug: String,
    original_url: String,
    is_enhanced: bool,
    parent_id: Option<i64>,
    reference_urls: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ArticleRow> for ArticleRecord {
    type Error = StorageError;

    fn try_from(row: ArticleRow) -> Result<Self, Self::Error> {
        let published_date = row
            .published_date
            .as_deref()
            .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
            .transpose()
            .map_err(decode_error)?;
        let reference_urls = match row.reference_urls.as_deref() {
            Some(json) if !json.is_empty() => serde_json::from_str(json).map_err(decode_error)?,
            _ => Vec::new(),
        };
        Ok(ArticleRecord {
            id: row.id,
            title: row.title,
            content: row.content,
            author: row.author,
            published_date,
            slug: row.slug,
            original_url: row.original_url,
            is_enhanced: row.is_enhanced,
            parent_id: row.parent_id,
            reference_urls,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

fn decode_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> StorageError {
    StorageError::Database(sqlx::Error::Decode(Box::new(e)))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(decode_error)
}

fn timestamp(dt: DateTime<Utc>) -> String {
    // Fixed width so text ordering matches time ordering
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn date_text(d: Option<NaiveDate>) -> Option<String> {
    d.map(|d| d.format("%Y-%m-%d").to_string())
}

fn validate_fields(title: &str, content: &str, author: Option<&str>, original_url: &str) -> Result<(), StorageError> {
    if title.trim().is_empty() {
        return Err(StorageError::Validation("title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(StorageError::Validation(format!(
            "title is longer than {} characters",
            MAX_TITLE_LEN
        )));
    }
    if content.trim().is_empty() {
        return Err(StorageError::Validation("content is required".into()));
    }
    if author.map_or(false, |a| a.chars().count() > MAX_AUTHOR_LEN) {
        return Err(StorageError::Validation(format!(
            "author is longer than {} characters",
            MAX_AUTHOR_LEN
        )));
    }
    match url::Url::parse(original_url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => Ok(()),
        _ => Err(StorageError::Validation(format!(
            "original_url '{}' is not a valid URL",
            original_url
        ))),
    }
}

fn validate_slug(slug: &str) -> Result<(), StorageError> {
    let ok = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if ok {
        Ok(())
    } else {
        Err(StorageError::Validation(format!("slug '{}' is not URL-safe", slug)))
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|d| d.message().contains("UNIQUE"))
        .unwrap_or(false)
}

const SELECT_COLUMNS: &str = "SELECT id, title, content, author, published_date, slug, original_url, \
     is_enhanced, parent_id, reference_urls, created_at, updated_at FROM articles";
const ORDERING: &str = "ORDER BY published_date DESC, created_at DESC, id DESC";

pub struct SqliteArticleStore {
    pool: SqlitePool,
}

impl SqliteArticleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file and make sure the schema exists.
    pub async fn open(path: &str) -> anyhow::Result<Self> {
        let pool = common::init_db_pool(path).await?;
        common::ensure_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    /// A private in-memory database on a single connection.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        common::ensure_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn check_parent(&self, parent_id: Option<i64>, self_id: Option<i64>) -> Result<(), StorageError> {
        let Some(parent_id) = parent_id else {
            return Ok(());
        };
        if Some(parent_id) == self_id {
            return Err(StorageError::Validation("an article cannot be its own parent".into()));
        }
        match self.get(parent_id).await {
            Ok(parent) if parent.is_enhanced => Err(StorageError::Validation(format!(
                "parent {} is itself an enhanced article",
                parent_id
            ))),
            Ok(_) => Ok(()),
            Err(StorageError::NotFound(_)) => Err(StorageError::Validation(format!(
                "parent article {} does not exist",
                parent_id
            ))),
            Err(e) => Err(e),
        }
    }

    async fn slug_taken_by_other(&self, slug: &str, id: i64) -> Result<bool, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE slug = ? AND id != ?")
            .bind(slug)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

#[async_trait]
impl ArticleStore for SqliteArticleStore {
    async fn list(&self, filter: ArticleFilter) -> Result<Vec<ArticleRecord>, StorageError> {
        let rows = match filter.enhanced {
            Some(enhanced) => {
                sqlx::query_as::<_, ArticleRow>(&format!("{} WHERE is_enhanced = ? {}", SELECT_COLUMNS, ORDERING))
                    .bind(enhanced)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, ArticleRow>(&format!("{} {}", SELECT_COLUMNS, ORDERING))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(ArticleRecord::try_from).collect()
    }

    async fn latest_original(&self) -> Result<Option<ArticleRecord>, StorageError> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "{} WHERE is_enhanced = 0 {} LIMIT 1",
            SELECT_COLUMNS, ORDERING
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.map(ArticleRecord::try_from).transpose()
    }

    async fn get(&self, id: i64) -> Result<ArticleRecord, StorageError> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => ArticleRecord::try_from(row),
            None => Err(StorageError::NotFound(id)),
        }
    }

    async fn create(&self, article: NewArticle) -> Result<ArticleRecord, StorageError> {
        let title = article.title.trim().to_string();
        validate_fields(&title, &article.content, article.author.as_deref(), &article.original_url)?;
        if article.is_enhanced != article.parent_id.is_some() {
            return Err(StorageError::Validation(
                "an article is enhanced exactly when it has a parent".into(),
            ));
        }
        self.check_parent(article.parent_id, None).await?;

        let slug = match article.slug {
            Some(slug) => {
                validate_slug(&slug)?;
                if self.slug_exists(&slug).await? {
                    return Err(StorageError::SlugTaken(slug));
                }
                slug
            }
            None => unique_slug(self, &slugify(&title)).await?,
        };

        let now = timestamp(Utc::now());
        let refs = serde_json::to_string(&article.reference_urls)
            .map_err(|e| StorageError::Validation(format!("reference_urls: {}", e)))?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO articles (title, content, author, published_date, slug, original_url,
                                  is_enhanced, parent_id, reference_urls, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&title)
        .bind(&article.content)
        .bind(&article.author)
        .bind(date_text(article.published_date))
        .bind(&slug)
        .bind(&article.original_url)
        .bind(article.is_enhanced)
        .bind(article.parent_id)
        .bind(&refs)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::SlugTaken(slug.clone())
            } else {
                StorageError::Database(e)
            }
        })?;

        debug!("storage: created article {} '{}' ({})", id, title, slug);
        self.get(id).await
    }

    async fn update(&self, id: i64, changes: ArticleUpdate) -> Result<ArticleRecord, StorageError> {
        let mut record = self.get(id).await?;

        if let Some(title) = changes.title {
            record.title = title.trim().to_string();
        }
        if let Some(content) = changes.content {
            record.content = content;
        }
        if let Some(author) = changes.author {
            record.author = author;
        }
        if let Some(date) = changes.published_date {
            record.published_date = date;
        }
        if let Some(url) = changes.original_url {
            record.original_url = url;
        }
        if let Some(refs) = changes.reference_urls {
            record.reference_urls = refs;
        }
        if let Some(parent_id) = changes.parent_id {
            self.check_parent(parent_id, Some(id)).await?;
            record.parent_id = parent_id;
            record.is_enhanced = parent_id.is_some();
        }
        if let Some(slug) = changes.slug {
            validate_slug(&slug)?;
            if self.slug_taken_by_other(&slug, id).await? {
                return Err(StorageError::SlugTaken(slug));
            }
            record.slug = slug;
        }
        validate_fields(&record.title, &record.content, record.author.as_deref(), &record.original_url)?;

        let refs = serde_json::to_string(&record.reference_urls)
            .map_err(|e| StorageError::Validation(format!("reference_urls: {}", e)))?;
        sqlx::query(
            r#"
            UPDATE articles
               SET title = ?, content = ?, author = ?, published_date = ?, slug = ?,
                   original_url = ?, is_enhanced = ?, parent_id = ?, reference_urls = ?,
                   updated_at = ?
             WHERE id = ?
            "#,
        )
        .bind(&record.title)
        .bind(&record.content)
        .bind(&record.author)
        .bind(date_text(record.published_date))
        .bind(&record.slug)
        .bind(&record.original_url)
        .bind(record.is_enhanced)
        .bind(record.parent_id)
        .bind(&refs)
        .bind(timestamp(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::SlugTaken(record.slug.clone())
            } else {
                StorageError::Database(e)
            }
        })?;

        self.get(id).await
    }

    async fn delete(&self, id: i64) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        // Derivatives go with their original
        sqlx::query("DELETE FROM articles WHERE parent_id = ?")
            .bind(id)
            .execute(&mut tx)
            .await?;
        let result = sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(id)
            .execute(&mut tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StorageError::NotFound(id));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE slug = ?")
            .bind(slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn find_enhanced_child(&self, parent_id: i64) -> Result<Option<ArticleRecord>, StorageError> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "{} WHERE parent_id = ? AND is_enhanced = 1 ORDER BY id LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(parent_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ArticleRecord::try_from).transpose()
    }
}
