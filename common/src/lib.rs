/*!
common/src/lib.rs

Shared configuration types and DB helper functions for blogshift.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader for a TOML config file, with default/override merging
- Helpers to initialize an SQLite pool and create the `articles` schema
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/blogshift.db")
    pub path: String,
}

/// The blog being acquired from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Listing root, e.g. "https://beyondchats.com/blogs/"
    pub base_url: Option<String>,
    /// Brand token stripped from titles ("BeyondChats")
    pub brand: Option<String>,
    /// Path segment every article lives under ("blogs")
    pub blog_segment: Option<String>,
    /// Hard cap on listing pages visited during discovery
    pub max_pages: Option<u32>,
    /// Path fragments that never lead to an article
    pub excluded_paths: Option<Vec<String>>,
}

/// Politeness / fetching configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolitenessConfig {
    pub fetch_timeout_seconds: Option<u64>,
    /// Pause between consecutive article fetches during acquisition
    pub delay_seconds: Option<u64>,
    pub user_agent: Option<String>,
}

/// Reference search configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    pub engine_url: Option<String>,
    pub renderer: Option<String>, // "http", "chromium"
    pub settle_millis: Option<u64>,
    pub render_timeout_seconds: Option<u64>,
    pub max_references: Option<usize>,
    pub reference_delay_seconds: Option<u64>,
    pub article_delay_seconds: Option<u64>,
}

/// Remote LLM config (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub site: Option<SiteConfig>,
    pub politeness: Option<PolitenessConfig>,
    pub search: Option<SearchConfig>,
    pub llm: Option<LlmConfig>,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        if let Some(path) = default_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await
                    .with_context(|| format!("Failed to read default config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .context("Failed to parse default configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        if let Some(path) = override_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await
                    .with_context(|| format!("Failed to read override config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .context("Failed to parse override configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    pub fn site(&self) -> SiteConfig {
        self.site.clone().unwrap_or_default()
    }

    pub fn politeness(&self) -> PolitenessConfig {
        self.politeness.clone().unwrap_or_default()
    }

    pub fn search(&self) -> SearchConfig {
        self.search.clone().unwrap_or_default()
    }

    pub fn llm(&self) -> LlmConfig {
        self.llm.clone().unwrap_or_default()
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Initialize an SQLite connection pool.
///
/// This function will create the parent directory if necessary, ensure the DB file exists
/// (attempting to create it if missing), and return a configured `SqlitePool`:
/// - max_connections: 5
/// - WAL journal mode
///
/// Example:
///   let pool = init_db_pool("data/blogshift.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    // Creating the file up front surfaces permission problems with a clearer message
    // than the SQLite connect error would.
    tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to create or open DB file: {}", path))?;

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}

/// Create the `articles` table and its indexes if they do not exist yet.
///
/// `parent_id` points at the original record of an enhanced derivative. Dates are stored as
/// ISO-8601 text (`YYYY-MM-DD` for `published_date`, RFC 3339 for timestamps).
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    let stmts = [
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            author TEXT,
            published_date TEXT,
            slug TEXT NOT NULL UNIQUE,
            original_url TEXT NOT NULL,
            is_enhanced BOOLEAN NOT NULL DEFAULT FALSE,
            parent_id INTEGER REFERENCES articles(id) ON DELETE CASCADE,
            reference_urls TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
        "CREATE INDEX IF NOT EXISTS idx_articles_is_enhanced ON articles(is_enhanced);",
        "CREATE INDEX IF NOT EXISTS idx_articles_published_date ON articles(published_date);",
        "CREATE INDEX IF NOT EXISTS idx_articles_parent_id ON articles(parent_id);",
    ];

    for stmt in stmts {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .context("Failed to create articles schema")?;
    }

    Ok(())
}
