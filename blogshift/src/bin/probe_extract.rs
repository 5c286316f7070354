use std::sync::Arc;

use blogshift::classify::{LinkClassifier, SiteProfile};
use blogshift::extract::ContentExtractor;
use blogshift::fetch::HttpFetcher;
use common::SiteConfig;

/// Run the article extractor against live pages and print what it finds.
/// Usage: probe_extract <url> [<url> ...]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        anyhow::bail!("usage: probe_extract <url> [<url> ...]");
    }

    let classifier = Arc::new(LinkClassifier::new(SiteProfile::from_config(&SiteConfig::default())?));
    let extractor = ContentExtractor::new(Arc::new(HttpFetcher::with_defaults()?), classifier);

    for url in urls {
        println!("\n{}", "=".repeat(60));
        println!("Testing: {}", url);
        println!("{}", "=".repeat(60));

        match extractor.extract(&url).await {
            Ok(article) => {
                println!("✓ Success!");
                println!("  Title: {}", article.title);
                println!("  Author: {}", article.author.as_deref().unwrap_or("none"));
                println!(
                    "  Published: {}",
                    article.published_date.map(|d| d.to_string()).unwrap_or_else(|| "none".into())
                );
                println!("  Content: {} chars", article.content.chars().count());
                let preview: String = article.content.chars().take(200).collect();
                println!("\n  {}", preview);
            }
            Err(e) => {
                println!("✗ Failed: {}", e);
            }
        }
    }
    Ok(())
}
