use blogshift::llm::enhancer::Enhancer;
use blogshift::llm::remote::RemoteLlmProvider;
use blogshift::llm::{LlmProvider, LlmRequest};
use blogshift::reference::ReferenceArticle;
use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;

const COMPLETION: &str = r#"{
    "model": "gpt-3.5-turbo-0125",
    "choices": [{
        "message": {
            "role": "assistant",
            "content": "This is a test response"
        },
        "finish_reason": "stop"
    }],
    "usage": {
        "prompt_tokens": 10,
        "completion_tokens": 5,
        "total_tokens": 15
    }
}"#;

#[tokio::test]
async fn test_remote_provider_with_mock() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .match_header("authorization", "Bearer fake-api-key")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-3.5-turbo",
            "max_tokens": 100,
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Test prompt"}
            ]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(COMPLETION)
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-3.5-turbo");

    let request = LlmRequest {
        system: Some("Be brief.".to_string()),
        prompt: "Test prompt".to_string(),
        max_tokens: Some(100),
        temperature: Some(0.7),
        timeout_seconds: Some(10),
    };

    let response = provider.generate(request).await.unwrap();
    assert_eq!(response.content, "This is a test response");
    assert_eq!(response.usage.prompt_tokens, 10);
    assert_eq!(response.usage.completion_tokens, 5);
    assert_eq!(response.usage.total_tokens, 15);
    assert_eq!(response.model, "gpt-3.5-turbo-0125");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_remote_provider_without_usage() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": "ok"}}]}"#)
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "local-model");
    let response = provider.generate(LlmRequest::new("Test")).await.unwrap();

    assert_eq!(response.content, "ok");
    assert_eq!(response.usage.total_tokens, 0);
    assert_eq!(response.model, "local-model");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_remote_provider_error_handling() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": {"message": "Rate limit exceeded"}}"#)
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-3.5-turbo");

    let result = provider.generate(LlmRequest::new("Test")).await;

    let err = result.unwrap_err().to_string();
    assert!(err.contains("429"));
    assert!(err.contains("Rate limit exceeded"));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_remote_provider_timeout() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(std::time::Duration::from_secs(3));
            w.write_all(b"too late")
        })
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-3.5-turbo");

    let request = LlmRequest {
        timeout_seconds: Some(1),
        ..LlmRequest::new("Test")
    };

    let result = provider.generate(request).await;

    assert!(result.unwrap_err().to_string().contains("timed out"));
}

#[tokio::test]
async fn test_enhancer_over_remote_provider() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(json!({"max_tokens": 2000})),
            Matcher::Regex(r#""role":"system","content":"You are an expert content writer who improves"#.to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(COMPLETION)
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-3.5-turbo");
    let enhancer = Enhancer::new(Arc::new(provider));
    let references = vec![ReferenceArticle {
        title: "A reference".to_string(),
        url: "https://ref.example/blog/a".to_string(),
        content: "Reference text".to_string(),
    }];

    let rewritten = enhancer
        .enhance("Original title", "Original content", &references)
        .await
        .unwrap();
    assert_eq!(rewritten, "This is a test response");

    mock.assert_async().await;
}
