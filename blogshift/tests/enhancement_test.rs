use blogshift::fetch::{Fetch, HttpFetcher};
use blogshift::llm::enhancer::Enhancer;
use blogshift::llm::remote::RemoteLlmProvider;
use blogshift::pipeline::{EnhancementOutcome, EnhancementPipeline};
use blogshift::publish::Publisher;
use blogshift::reference::ReferenceScraper;
use blogshift::search::ReferenceSearcher;
use blogshift::storage::{ArticleFilter, ArticleRecord, ArticleStore, NewArticle, SqliteArticleStore};
use blogshift::throttle::ManualClock;
use mockito::{Matcher, Server, ServerGuard};
use std::sync::Arc;
use std::time::Duration;

const COMPLETION: &str = r#"{
    "model": "gpt-3.5-turbo",
    "choices": [{"message": {"role": "assistant", "content": "Rewritten body with better structure."}}],
    "usage": {"prompt_tokens": 900, "completion_tokens": 300, "total_tokens": 1200}
}"#;

fn reference_page(topic: &str) -> String {
    let para = format!("{topic} matters because customers expect answers in seconds, not hours. ");
    format!(
        "<html><body><nav>Home Blog Pricing</nav><article><h1>{topic}</h1><p>{}</p><p>{}</p></article></body></html>",
        para.repeat(3),
        para.repeat(2)
    )
}

/// Search engine reached as `localhost`, references served from `127.0.0.1`, so the
/// engine's own host filter does not hide them.
fn engine_url(server: &ServerGuard) -> String {
    let port = server.host_with_port().rsplit(':').next().unwrap_or_default().to_string();
    format!("http://localhost:{}/search?q=", port)
}

fn results_page(server: &ServerGuard) -> String {
    format!(
        r#"<html><body><div id="search">
            <div class="g"><a href="https://www.youtube.com/watch?v=abc"><h3>Watch this</h3></a></div>
            <div class="g"><a href="{base}/blog/chat-guide"><h3>The Complete Live Chat Guide</h3></a></div>
            <div class="g"><a href="{base}/blog/support-tips"><h3>Support Tips That Work</h3></a></div>
            <div class="g"><a href="https://example.org/whitepaper.pdf"><h3>Whitepaper</h3></a></div>
        </div></body></html>"#,
        base = server.url()
    )
}

async fn seed_original(store: &SqliteArticleStore, title: &str) -> ArticleRecord {
    store
        .create(NewArticle {
            title: title.to_string(),
            content: "Customer support is changing quickly.".to_string(),
            author: Some("Priya Raman".to_string()),
            original_url: format!("https://beyondchats.com/blogs/{}/", title.to_lowercase().replace(' ', "-")),
            ..NewArticle::default()
        })
        .await
        .unwrap()
}

fn pipeline(server: &ServerGuard, store: Arc<SqliteArticleStore>) -> (EnhancementPipeline, Arc<ManualClock>) {
    let fetcher: Arc<dyn Fetch> = Arc::new(HttpFetcher::with_defaults().unwrap());
    let provider = RemoteLlmProvider::new(
        format!("{}/v1/chat/completions", server.url()),
        "fake-api-key",
        "gpt-3.5-turbo",
    );
    let clock = Arc::new(ManualClock::new());
    let pipeline = EnhancementPipeline::new(
        ReferenceSearcher::new(fetcher.clone(), &engine_url(server)),
        ReferenceScraper::new(fetcher),
        Enhancer::new(Arc::new(provider)),
        Arc::new(Publisher::new(store)),
        clock.clone(),
    )
    .with_delays(Duration::from_secs(5), Duration::from_secs(2));
    (pipeline, clock)
}

#[tokio::test]
async fn test_enhancement_publishes_linked_version_once() {
    let mut server = Server::new_async().await;
    let results = results_page(&server);
    let search = server
        .mock("GET", Matcher::Regex(r"^/search".to_string()))
        .match_query(Matcher::UrlEncoded(
            "q".to_string(),
            "How Conversational AI Is Changing Customer Support".to_string(),
        ))
        .with_status(200)
        .with_body(results)
        .expect(1)
        .create_async()
        .await;
    let _guide = server
        .mock("GET", "/blog/chat-guide")
        .with_status(200)
        .with_body(reference_page("Live chat"))
        .create_async()
        .await;
    let _tips = server
        .mock("GET", "/blog/support-tips")
        .with_status(200)
        .with_body(reference_page("Fast support"))
        .create_async()
        .await;
    let llm = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer fake-api-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(COMPLETION)
        .expect(1)
        .create_async()
        .await;

    let store = Arc::new(SqliteArticleStore::in_memory().await.unwrap());
    let original = seed_original(&store, "How Conversational AI Is Changing Customer Support").await;

    // An original that already has an enhanced child is never picked up
    let done = seed_original(&store, "Already Enhanced Article").await;
    store
        .create(NewArticle {
            title: "Already Enhanced Article (Enhanced)".to_string(),
            content: "Earlier rewrite".to_string(),
            original_url: done.original_url.clone(),
            is_enhanced: true,
            parent_id: Some(done.id),
            ..NewArticle::default()
        })
        .await
        .unwrap();

    let (pipeline, clock) = pipeline(&server, store.clone());
    let outcomes = pipeline.run_enhancement(None).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].article_id, original.id);
    let EnhancementOutcome::Published { enhanced_id } = outcomes[0].outcome else {
        panic!("expected a published outcome, got {:?}", outcomes[0].outcome);
    };
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);

    let enhanced = store.get(enhanced_id).await.unwrap();
    assert_eq!(enhanced.title, "How Conversational AI Is Changing Customer Support (Enhanced)");
    assert_eq!(enhanced.slug, "how-conversational-ai-is-changing-customer-support-enhanced");
    assert!(enhanced.is_enhanced);
    assert_eq!(enhanced.parent_id, Some(original.id));
    assert_eq!(enhanced.author.as_deref(), Some("Priya Raman"));
    assert_eq!(
        enhanced.reference_urls,
        vec![
            format!("{}/blog/chat-guide", server.url()),
            format!("{}/blog/support-tips", server.url()),
        ]
    );
    assert!(enhanced.content.starts_with("Rewritten body with better structure.\n\n---\n\n## References\n\n"));
    assert!(enhanced
        .content
        .contains(&format!("1. [The Complete Live Chat Guide]({}/blog/chat-guide)", server.url())));

    // A second run finds nothing left to do
    let again = pipeline.run_enhancement(None).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(store.list(ArticleFilter::enhanced()).await.unwrap().len(), 2);

    search.assert_async().await;
    llm.assert_async().await;
}

#[tokio::test]
async fn test_social_only_results_retry_then_fail() {
    let mut server = Server::new_async().await;
    let search = server
        .mock("GET", Matcher::Regex(r"^/search".to_string()))
        .with_status(200)
        .with_body(
            r#"<div class="g"><a href="https://www.facebook.com/somepage">Facebook</a></div>
               <div class="g"><a href="https://youtu.be/xyz">Video</a></div>
               <div class="g"><a href="https://twitter.com/someone">Tweet</a></div>"#,
        )
        .expect(2)
        .create_async()
        .await;
    let llm = server
        .mock("POST", "/v1/chat/completions")
        .expect(0)
        .create_async()
        .await;

    let store = Arc::new(SqliteArticleStore::in_memory().await.unwrap());
    seed_original(&store, "Chat Widgets Explained").await;

    let (pipeline, _clock) = pipeline(&server, store.clone());
    let outcomes = pipeline.run_enhancement(Some(3)).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0].outcome {
        EnhancementOutcome::Failed { reason } => assert!(reason.contains("no usable search results")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(store.list(ArticleFilter::enhanced()).await.unwrap().is_empty());

    search.assert_async().await;
    llm.assert_async().await;
}
