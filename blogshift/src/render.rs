//! Rendering-capable fetch for search engine result pages.
//!
//! Search engines serve little to a plain HTTP client, so search queries go through a
//! headless Chromium (default cargo feature `browser`). The HTTP fetcher remains as a
//! degraded fallback.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::fetch::{Fetch, HttpFetcher};

pub const DEFAULT_SETTLE_MILLIS: u64 = 3000;
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 30;

/// Which transport the reference searcher uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RendererKind {
    Http,
    #[default]
    Chromium,
}

impl std::str::FromStr for RendererKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" => Ok(RendererKind::Http),
            "chromium" | "chrome" | "browser" => Ok(RendererKind::Chromium),
            other => anyhow::bail!("unknown search renderer '{}' (expected \"http\" or \"chromium\")", other),
        }
    }
}

/// Build the fetcher used for search result pages.
pub async fn search_fetcher(
    kind: RendererKind,
    user_agent: &str,
    timeout: Duration,
    settle: Duration,
) -> anyhow::Result<Arc<dyn Fetch>> {
    match kind {
        RendererKind::Http => {
            warn!("search: using the plain HTTP renderer, results may be empty or blocked");
            Ok(Arc::new(HttpFetcher::new(user_agent, timeout)?))
        }
        RendererKind::Chromium => chromium_fetcher(user_agent, timeout, settle).await,
    }
}

#[cfg(feature = "browser")]
async fn chromium_fetcher(
    user_agent: &str,
    timeout: Duration,
    settle: Duration,
) -> anyhow::Result<Arc<dyn Fetch>> {
    Ok(Arc::new(chromium::ChromiumFetcher::launch(user_agent, timeout, settle).await?))
}

#[cfg(not(feature = "browser"))]
async fn chromium_fetcher(
    _user_agent: &str,
    _timeout: Duration,
    _settle: Duration,
) -> anyhow::Result<Arc<dyn Fetch>> {
    anyhow::bail!("search.renderer = \"chromium\" requires building with `--features browser`")
}

#[cfg(feature = "browser")]
pub mod chromium {
    use anyhow::Context;
    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use futures::StreamExt;
    use std::time::Duration;
    use tracing::{debug, warn};

    use crate::fetch::{Fetch, FetchError};

    const HIDE_WEBDRIVER: &str =
        "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

    /// Headless Chromium that hides the usual automation signals.
    pub struct ChromiumFetcher {
        browser: Browser,
        user_agent: String,
        timeout: Duration,
        settle: Duration,
    }

    impl ChromiumFetcher {
        pub async fn launch(user_agent: &str, timeout: Duration, settle: Duration) -> anyhow::Result<Self> {
            let config = BrowserConfig::builder()
                .arg("--headless=new")
                .arg("--no-sandbox")
                .arg("--disable-setuid-sandbox")
                .arg("--disable-dev-shm-usage")
                .arg("--disable-blink-features=AutomationControlled")
                .build()
                .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

            let (browser, mut handler) = Browser::launch(config)
                .await
                .context("failed to launch Chromium")?;

            tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        debug!("chromium: handler event error: {}", e);
                    }
                }
            });

            Ok(Self {
                browser,
                user_agent: user_agent.to_string(),
                timeout,
                settle,
            })
        }

        async fn render(&self, url: &str) -> anyhow::Result<String> {
            let page = self
                .browser
                .new_page("about:blank")
                .await
                .context("failed to create new page")?;
            page.set_user_agent(self.user_agent.as_str())
                .await
                .context("failed to set user agent")?;
            page.evaluate_on_new_document(HIDE_WEBDRIVER)
                .await
                .context("failed to install webdriver override")?;

            let outcome = async {
                page.goto(url).await.context("navigation failed")?;
                tokio::time::sleep(self.settle).await;
                page.content().await.context("failed to read rendered DOM")
            }
            .await;

            if let Err(e) = page.close().await {
                warn!("chromium: failed to close page: {}", e);
            }
            outcome
        }
    }

    #[async_trait]
    impl Fetch for ChromiumFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            match tokio::time::timeout(self.timeout + self.settle, self.render(url)).await {
                Ok(Ok(html)) => Ok(html),
                Ok(Err(e)) => Err(FetchError::Render {
                    url: url.to_string(),
                    message: format!("{:#}", e),
                }),
                Err(_) => Err(FetchError::Timeout {
                    url: url.to_string(),
                }),
            }
        }
    }
}
