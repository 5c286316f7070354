//! Rewriting an article in the style of the pages that outrank it.

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use super::{LlmProvider, LlmRequest};
use crate::reference::ReferenceArticle;

pub const SYSTEM_PROMPT: &str =
    "You are an expert content writer who improves articles to match top-ranking content on Google.";
pub const DEFAULT_MAX_TOKENS: usize = 2000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

const REFERENCE_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("no reference content to learn from")]
    NoReferences,
    #[error("language model returned an empty completion")]
    EmptyCompletion,
    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

pub struct Enhancer {
    provider: Arc<dyn LlmProvider>,
    max_tokens: usize,
    temperature: f32,
}

impl Enhancer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_sampling(mut self, max_tokens: usize, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// One completion call; returns the rewritten body, trimmed.
    pub async fn enhance(
        &self,
        title: &str,
        content: &str,
        references: &[ReferenceArticle],
    ) -> Result<String, EnhanceError> {
        if references.is_empty() {
            return Err(EnhanceError::NoReferences);
        }

        let request = LlmRequest {
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            ..LlmRequest::new(build_prompt(title, content, references)).with_system(SYSTEM_PROMPT)
        };
        let response = self.provider.generate(request).await?;

        let rewritten = response.content.trim();
        if rewritten.is_empty() {
            return Err(EnhanceError::EmptyCompletion);
        }
        info!(
            "enhance: '{}' rewritten by {} ({} tokens)",
            title, response.model, response.usage.total_tokens
        );
        Ok(rewritten.to_string())
    }
}

pub fn build_prompt(title: &str, content: &str, references: &[ReferenceArticle]) -> String {
    let reference_texts = references
        .iter()
        .map(|r| format!("Title: {}\nContent: {}", r.title, r.content))
        .collect::<Vec<_>>()
        .join(REFERENCE_SEPARATOR);

    format!(
        r#"You are an expert content writer. Your task is to update and improve an article to match the style, formatting, and quality of top-ranking articles on Google.

Original Article:
Title: {title}
Content: {content}

Reference Articles (top-ranking articles on Google):
{reference_texts}

Please update the original article to:
1. Match the writing style and tone of the reference articles
2. Improve the formatting and structure
3. Enhance the content quality while keeping the core message
4. Make it more engaging and professional
5. Ensure proper paragraph breaks and readability

Return ONLY the updated article content, without any additional commentary or explanation."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, UsageMetadata};
    use std::sync::Mutex;

    struct Scripted {
        reply: String,
        seen: Mutex<Vec<LlmRequest>>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for Scripted {
        async fn generate(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
            self.seen.lock().unwrap().push(request);
            Ok(LlmResponse {
                content: self.reply.clone(),
                usage: UsageMetadata::default(),
                model: "scripted".to_string(),
            })
        }
    }

    fn refs() -> Vec<ReferenceArticle> {
        vec![
            ReferenceArticle {
                title: "First ref".to_string(),
                url: "https://a.example/blog/one".to_string(),
                content: "Alpha body".to_string(),
            },
            ReferenceArticle {
                title: "Second ref".to_string(),
                url: "https://b.example/blog/two".to_string(),
                content: "Beta body".to_string(),
            },
        ]
    }

    #[test]
    fn prompt_carries_original_and_separated_references() {
        let prompt = build_prompt("Chatbots 101", "Original body", &refs());
        assert!(prompt.contains("Title: Chatbots 101\nContent: Original body"));
        assert!(prompt.contains("Title: First ref\nContent: Alpha body\n\n---\n\nTitle: Second ref\nContent: Beta body"));
        assert!(prompt.ends_with("without any additional commentary or explanation."));
    }

    #[tokio::test]
    async fn sends_system_role_and_sampling() {
        let provider = Arc::new(Scripted {
            reply: "  Better body.\n".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let enhancer = Enhancer::new(provider.clone());
        let out = enhancer.enhance("Chatbots 101", "Original body", &refs()).await.unwrap();
        assert_eq!(out, "Better body.");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].system.as_deref(), Some(SYSTEM_PROMPT));
        assert_eq!(seen[0].max_tokens, Some(2000));
        assert_eq!(seen[0].temperature, Some(0.7));
    }

    #[tokio::test]
    async fn blank_completion_and_missing_references_fail() {
        let provider = Arc::new(Scripted {
            reply: " \n ".to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let enhancer = Enhancer::new(provider);
        assert!(matches!(
            enhancer.enhance("T", "C", &refs()).await,
            Err(EnhanceError::EmptyCompletion)
        ));
        assert!(matches!(
            enhancer.enhance("T", "C", &[]).await,
            Err(EnhanceError::NoReferences)
        ));
    }
}
