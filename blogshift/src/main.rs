/*
blogshift - command-line entry point
Acquires blog articles into the local database and publishes LLM-enhanced versions of them.
*/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::Config;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use blogshift::classify::{LinkClassifier, SiteProfile};
use blogshift::discover::Discoverer;
use blogshift::extract::ContentExtractor;
use blogshift::fetch::{Fetch, HttpFetcher, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use blogshift::llm::enhancer::{Enhancer, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use blogshift::llm::remote::{RemoteLlmProvider, DEFAULT_API_URL, DEFAULT_MODEL};
use blogshift::pipeline::{AcquisitionPipeline, EnhancementOutcome, EnhancementPipeline};
use blogshift::publish::Publisher;
use blogshift::reference::ReferenceScraper;
use blogshift::render::{search_fetcher, RendererKind, DEFAULT_RENDER_TIMEOUT_SECS, DEFAULT_SETTLE_MILLIS};
use blogshift::search::{ReferenceSearcher, DEFAULT_ENGINE_URL, DEFAULT_MAX_REFERENCES};
use blogshift::storage::{ArticleFilter, ArticleStore, SqliteArticleStore};
use blogshift::throttle::{Clock, TokioClock};

const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_ACQUIRE_DELAY_SECS: u64 = 1;
const DEFAULT_ARTICLE_DELAY_SECS: u64 = 5;
const DEFAULT_REFERENCE_DELAY_SECS: u64 = 2;

#[derive(Parser, Debug)]
#[command(name = "blogshift", about = "Blog article acquisition and LLM enhancement pipeline")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover the oldest blog articles and store them
    Acquire {
        /// Number of oldest articles to acquire
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Publish enhanced versions of stored articles that have none yet
    Enhance {
        /// Maximum number of articles to enhance in this run
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List stored articles as JSON
    List {
        #[arg(long, conflicts_with = "original")]
        enhanced: bool,
        #[arg(long)]
        original: bool,
    },
    /// Show the most recent original article
    Latest,
    /// Show one article by id
    Show { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = load_config(args.config).await?;

    let db_path = config.database.path.clone();
    let store = match SqliteArticleStore::open(&db_path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(%e, db_path = %db_path, "failed to open article database");
            return Err(e);
        }
    };
    info!(db_path = %db_path, "database ready");

    match args.command {
        Command::Acquire { count } => acquire(&config, store, count).await,
        Command::Enhance { limit } => enhance(&config, store, limit).await,
        Command::List { enhanced, original } => {
            let filter = if enhanced {
                ArticleFilter::enhanced()
            } else if original {
                ArticleFilter::originals()
            } else {
                ArticleFilter::all()
            };
            print_json(&store.list(filter).await?)
        }
        Command::Latest => match store.latest_original().await? {
            Some(article) => print_json(&article),
            None => anyhow::bail!("no original articles stored yet"),
        },
        Command::Show { id } => print_json(&store.get(id).await?),
    }
}

async fn load_config(explicit: Option<PathBuf>) -> Result<Config> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = explicit {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let config = Config::load_with_defaults(
        if default_path.exists() { Some(default_path.as_path()) } else { None },
        override_path.as_deref(),
    )
    .await
    .context("failed to load configuration")?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");
    Ok(config)
}

fn page_fetcher(config: &Config) -> Result<Arc<dyn Fetch>> {
    let politeness = config.politeness();
    let user_agent = politeness.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
    let timeout = Duration::from_secs(politeness.fetch_timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS));
    Ok(Arc::new(HttpFetcher::new(user_agent, timeout)?))
}

async fn acquire(config: &Config, store: Arc<SqliteArticleStore>, count: usize) -> Result<()> {
    let profile = SiteProfile::from_config(&config.site())?;
    info!(base_url = %profile.base_url, max_pages = profile.max_pages, "acquiring {} article(s)", count);
    let classifier = Arc::new(LinkClassifier::new(profile));
    let fetcher = page_fetcher(config)?;
    let delay = config.politeness().delay_seconds.unwrap_or(DEFAULT_ACQUIRE_DELAY_SECS);
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());

    let pipeline = AcquisitionPipeline::new(
        Discoverer::new(fetcher.clone(), classifier.clone()),
        ContentExtractor::new(fetcher, classifier),
        Arc::new(Publisher::new(store)),
        clock,
    )
    .with_delay(Duration::from_secs(delay));

    let report = pipeline.run_acquisition(count).await;
    print_json(&report)?;
    if report.saved.is_empty() && report.discovered > 0 {
        anyhow::bail!("none of the {} discovered article(s) could be saved", report.discovered);
    }
    Ok(())
}

async fn enhance(config: &Config, store: Arc<SqliteArticleStore>, limit: Option<usize>) -> Result<()> {
    let llm = config.llm();
    let key_env = llm.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
    let api_key = std::env::var(key_env)
        .with_context(|| format!("{} must be set to run the enhancer", key_env))?;

    let search = config.search();
    let politeness = config.politeness();
    let renderer: RendererKind = search
        .renderer
        .as_deref()
        .map(str::parse::<RendererKind>)
        .transpose()?
        .unwrap_or_default();
    let search_fetch = search_fetcher(
        renderer,
        politeness.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT),
        Duration::from_secs(search.render_timeout_seconds.unwrap_or(DEFAULT_RENDER_TIMEOUT_SECS)),
        Duration::from_millis(search.settle_millis.unwrap_or(DEFAULT_SETTLE_MILLIS)),
    )
    .await?;

    let provider = RemoteLlmProvider::new(
        llm.api_url.as_deref().unwrap_or(DEFAULT_API_URL),
        api_key,
        llm.model.as_deref().unwrap_or(DEFAULT_MODEL),
    )
    .with_defaults(
        llm.timeout_seconds.unwrap_or(DEFAULT_LLM_TIMEOUT_SECS),
        llm.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        llm.temperature.unwrap_or(DEFAULT_TEMPERATURE),
    );
    info!(model = %provider.model(), ?renderer, "enhancer ready");
    let enhancer = Enhancer::new(Arc::new(provider)).with_sampling(
        llm.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        llm.temperature.unwrap_or(DEFAULT_TEMPERATURE),
    );

    let searcher = ReferenceSearcher::new(search_fetch, search.engine_url.as_deref().unwrap_or(DEFAULT_ENGINE_URL))
        .with_max_results(search.max_references.unwrap_or(DEFAULT_MAX_REFERENCES));
    let pipeline = EnhancementPipeline::new(
        searcher,
        ReferenceScraper::new(page_fetcher(config)?),
        enhancer,
        Arc::new(Publisher::new(store)),
        Arc::new(TokioClock::new()),
    )
    .with_delays(
        Duration::from_secs(search.article_delay_seconds.unwrap_or(DEFAULT_ARTICLE_DELAY_SECS)),
        Duration::from_secs(search.reference_delay_seconds.unwrap_or(DEFAULT_REFERENCE_DELAY_SECS)),
    );

    let outcomes = pipeline.run_enhancement(limit).await?;
    print_json(&outcomes)?;
    let published = outcomes
        .iter()
        .filter(|o| matches!(o.outcome, EnhancementOutcome::Published { .. }))
        .count();
    info!("enhance: published {} of {} article(s)", published, outcomes.len());
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
