//! Configuration types for KYC extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. One struct holds every knob so a
//! config can be cloned into concurrent pipeline runs and logged as a unit.

use crate::error::KycError;
use crate::model::ModelClient;
use crate::progress::ProgressCallback;
use crate::retry::{RetryOn, RetryPolicy};
use std::fmt;
use std::sync::Arc;

/// Largest image the OCR tier accepts: 32 MiB.
pub const MAX_OCR_BYTES: usize = 32 * 1024 * 1024;

/// Largest image the visual fallback tier accepts: 5 MiB.
pub const MAX_VISUAL_BYTES: usize = 5 * 1024 * 1024;

/// Configuration for a KYC extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use kyc_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .provider_name("openai")
///     .ocr_model("gpt-4.1")
///     .max_fallback_attempts(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM provider name (e.g. "openai", "anthropic", "gemini").
    /// If None, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Model used for the primary structured extraction.
    pub ocr_model: String,

    /// Vision model used to read missing fields as free text.
    pub visual_model: String,

    /// Text-only model that structures the visual reply into JSON.
    pub reasoning_model: String,

    /// Pre-constructed clients. Each takes precedence over the provider
    /// settings for its tier.
    pub ocr_client: Option<Arc<dyn ModelClient>>,
    pub visual_client: Option<Arc<dyn ModelClient>>,
    pub reasoning_client: Option<Arc<dyn ModelClient>>,

    /// Sampling temperature for every model call. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens a model may generate per call. Default: 1024.
    pub max_tokens: usize,

    /// Image size ceiling for the OCR tier, in bytes. Default: 32 MiB.
    pub max_ocr_bytes: usize,

    /// Image size ceiling for the visual fallback tier, in bytes. Default: 5 MiB.
    ///
    /// Checked once, before the first fallback attempt.
    pub max_visual_bytes: usize,

    /// Fallback attempts (visual + reasoning round trips) before giving up. Default: 3.
    pub max_fallback_attempts: u32,

    /// Retry policy for image downloads. Default: 3 attempts, transient errors only.
    pub fetch_retry: RetryPolicy,

    /// Retry policy applied to each individual model call.
    /// Default: 3 attempts, any error.
    pub model_retry: RetryPolicy,

    /// Download timeout in seconds. Default: 30.
    pub fetch_timeout_secs: u64,

    /// Per-model-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Maximum documents processed at once by [`crate::extract_many`]. Default: 4.
    pub concurrency: usize,

    /// Optional observer for stage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider_name: None,
            ocr_model: "gpt-4.1-mini".to_string(),
            visual_model: "gpt-4.1-nano".to_string(),
            reasoning_model: "gpt-4.1-mini".to_string(),
            ocr_client: None,
            visual_client: None,
            reasoning_client: None,
            temperature: 0.0,
            max_tokens: 1024,
            max_ocr_bytes: MAX_OCR_BYTES,
            max_visual_bytes: MAX_VISUAL_BYTES,
            max_fallback_attempts: 3,
            fetch_retry: RetryPolicy::default(),
            model_retry: RetryPolicy::default().with_retry_on(RetryOn::AnyError),
            fetch_timeout_secs: 30,
            api_timeout_secs: 60,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let client = |c: &Option<Arc<dyn ModelClient>>| c.as_ref().map(|_| "<dyn ModelClient>");
        f.debug_struct("ExtractionConfig")
            .field("provider_name", &self.provider_name)
            .field("ocr_model", &self.ocr_model)
            .field("visual_model", &self.visual_model)
            .field("reasoning_model", &self.reasoning_model)
            .field("ocr_client", &client(&self.ocr_client))
            .field("visual_client", &client(&self.visual_client))
            .field("reasoning_client", &client(&self.reasoning_client))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_ocr_bytes", &self.max_ocr_bytes)
            .field("max_visual_bytes", &self.max_visual_bytes)
            .field("max_fallback_attempts", &self.max_fallback_attempts)
            .field("fetch_retry", &self.fetch_retry)
            .field("model_retry", &self.model_retry)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = model.into();
        self
    }

    pub fn visual_model(mut self, model: impl Into<String>) -> Self {
        self.config.visual_model = model.into();
        self
    }

    pub fn reasoning_model(mut self, model: impl Into<String>) -> Self {
        self.config.reasoning_model = model.into();
        self
    }

    pub fn ocr_client(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.config.ocr_client = Some(client);
        self
    }

    pub fn visual_client(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.config.visual_client = Some(client);
        self
    }

    pub fn reasoning_client(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.config.reasoning_client = Some(client);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_ocr_bytes(mut self, n: usize) -> Self {
        self.config.max_ocr_bytes = n;
        self
    }

    pub fn max_visual_bytes(mut self, n: usize) -> Self {
        self.config.max_visual_bytes = n;
        self
    }

    pub fn max_fallback_attempts(mut self, n: u32) -> Self {
        self.config.max_fallback_attempts = n;
        self
    }

    pub fn fetch_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.fetch_retry = policy;
        self
    }

    pub fn model_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.model_retry = policy;
        self
    }

    /// Change only the predicate of the model retry policy.
    pub fn model_retry_on(mut self, retry_on: RetryOn) -> Self {
        self.config.model_retry.retry_on = retry_on;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, KycError> {
        let c = &self.config;
        if c.max_fallback_attempts == 0 {
            return Err(KycError::InvalidConfig(
                "max_fallback_attempts must be ≥ 1".into(),
            ));
        }
        if c.fetch_retry.max_attempts == 0 || c.model_retry.max_attempts == 0 {
            return Err(KycError::InvalidConfig(
                "retry policies need at least one attempt".into(),
            ));
        }
        if c.fetch_timeout_secs == 0 || c.api_timeout_secs == 0 {
            return Err(KycError::InvalidConfig("timeouts must be ≥ 1s".into()));
        }
        if c.max_visual_bytes > c.max_ocr_bytes {
            return Err(KycError::InvalidConfig(format!(
                "visual ceiling ({} bytes) exceeds OCR ceiling ({} bytes)",
                c.max_visual_bytes, c.max_ocr_bytes
            )));
        }
        if c.concurrency == 0 {
            return Err(KycError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ExtractionConfig::default();
        assert_eq!(c.max_ocr_bytes, 32 * 1024 * 1024);
        assert_eq!(c.max_visual_bytes, 5 * 1024 * 1024);
        assert_eq!(c.max_fallback_attempts, 3);
        assert_eq!(c.fetch_timeout_secs, 30);
        assert_eq!(c.fetch_retry.retry_on, RetryOn::Retryable);
        assert_eq!(c.model_retry.retry_on, RetryOn::AnyError);
        assert_eq!(c.model_retry.max_attempts, 3);
    }

    #[test]
    fn builder_rejects_zero_attempts() {
        let err = ExtractionConfig::builder()
            .max_fallback_attempts(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, KycError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_inverted_ceilings() {
        let err = ExtractionConfig::builder()
            .max_ocr_bytes(1024)
            .max_visual_bytes(2048)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("exceeds OCR ceiling"));
    }

    #[test]
    fn model_retry_on_keeps_schedule() {
        let c = ExtractionConfig::builder()
            .model_retry_on(RetryOn::Retryable)
            .build()
            .unwrap();
        assert_eq!(c.model_retry.retry_on, RetryOn::Retryable);
        assert_eq!(c.model_retry.max_attempts, 3);
    }
}
