//! Hosted-model capability: "given a prompt and optionally an image, return text".
//!
//! The pipeline never talks to an LLM SDK directly. Each tier (OCR, visual,
//! reasoning) holds an `Arc<dyn ModelClient>`, which keeps the fallback
//! state machine testable with in-process fakes and lets callers plug in
//! caching or rate-limiting middleware.
//!
//! [`LlmModelClient`] is the production implementation, a thin adapter over
//! an [`edgequake_llm::LLMProvider`] that adds a per-call timeout and maps
//! every failure to [`KycError::ModelCall`].

use crate::error::{KycError, ModelTier};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Image attached to a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePart {
    /// Raw base64 payload plus its MIME type.
    Base64 { data: String, mime_type: String },
    /// A URL the provider forwards verbatim, typically a `data:` URI.
    Url(String),
}

/// A single request to a hosted model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    /// Instruction text sent as the user turn.
    pub prompt: String,
    /// Optional image sent alongside the prompt.
    pub image: Option<ImagePart>,
}

impl ModelRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(prompt: impl Into<String>, image: ImagePart) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
        }
    }
}

/// Text reply from a hosted model, with token accounting when available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl ModelReply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Anything that can answer a [`ModelRequest`].
///
/// Implementations must be stateless from the pipeline's point of view: one
/// client is shared read-only by every concurrent extraction.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send one request. Implementations should not retry internally; the
    /// caller owns the retry policy.
    async fn complete(&self, request: ModelRequest) -> Result<ModelReply, KycError>;
}

/// [`ModelClient`] backed by an `edgequake-llm` provider.
#[derive(Clone)]
pub struct LlmModelClient {
    provider: Arc<dyn LLMProvider>,
    tier: ModelTier,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl fmt::Debug for LlmModelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmModelClient")
            .field("provider", &"<dyn LLMProvider>")
            .field("tier", &self.tier)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmModelClient {
    pub fn new(provider: Arc<dyn LLMProvider>, tier: ModelTier) -> Self {
        Self {
            provider,
            tier,
            temperature: 0.0,
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

/// Translate a request into the provider's chat message list.
fn build_messages(request: ModelRequest) -> Vec<ChatMessage> {
    match request.image {
        None => vec![ChatMessage::user(request.prompt)],
        Some(ImagePart::Base64 { data, mime_type }) => vec![ChatMessage::user_with_images(
            request.prompt,
            vec![ImageData::new(data, mime_type).with_detail("high")],
        )],
        Some(ImagePart::Url(url)) => vec![ChatMessage::user_with_images(
            request.prompt,
            vec![ImageData::from_url(url)],
        )],
    }
}

#[async_trait]
impl ModelClient for LlmModelClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelReply, KycError> {
        let messages = build_messages(request);
        let options = build_options(self.temperature, self.max_tokens);

        let call = self.provider.chat(&messages, Some(&options));
        let response = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                KycError::model(
                    self.tier,
                    format!("timed out after {}s", self.timeout.as_secs()),
                )
            })?
            .map_err(|e| KycError::model(self.tier, e.to_string()))?;

        debug!(
            tier = %self.tier,
            prompt_tokens = response.prompt_tokens,
            completion_tokens = response.completion_tokens,
            "model reply received"
        );

        if response.content.trim().is_empty() {
            return Err(KycError::model(self.tier, "empty reply"));
        }

        Ok(ModelReply {
            content: response.content,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let opts = build_options(0.0, 1024);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(1024));
    }

    #[test]
    fn text_request_has_no_image() {
        let req = ModelRequest::text("hello");
        assert!(req.image.is_none());
        assert_eq!(build_messages(req).len(), 1);
    }
}
