//! Error types for the kyc-extract library.
//!
//! Every failure the pipeline can produce is a variant of [`KycError`]. The
//! variants fall into two groups that the retry machinery cares about:
//!
//! * **Retryable**: [`KycError::TransientFetch`] and [`KycError::ModelCall`].
//!   These are retried locally by [`crate::retry::RetryPolicy`] and only
//!   surface once the attempt budget is spent.
//!
//! * **Non-retryable**: everything else. Wrong payload kind, oversized
//!   payloads, bad configuration and an exhausted fallback budget surface
//!   immediately.
//!
//! [`KycError::is_retryable`] encodes that split so retry predicates never
//! have to match on variants themselves.

use crate::record::KycField;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the kyc-extract library.
#[derive(Debug, Error)]
pub enum KycError {
    // ── Acquisition errors ────────────────────────────────────────────────
    /// Timeout, connection failure or a server-side (5xx / 429) response
    /// while fetching the document image.
    #[error("Transient error fetching '{url}': {reason}")]
    TransientFetch { url: String, reason: String },

    /// The server answered, but with a status that retrying will not fix.
    #[error("Failed to fetch '{url}': HTTP {status}")]
    FetchFailed { url: String, status: u16 },

    /// The fetched payload is not an image.
    #[error("Source '{source_ref}' is not an image (content-type: '{content_type}')")]
    ContentType {
        source_ref: String,
        content_type: String,
    },

    /// Local image file does not exist.
    #[error("Image file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The source string is neither a URL nor a usable path.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// Image exceeds the ceiling of the tier that is about to be called.
    #[error("Image is {size} bytes, exceeding the {limit}-byte limit of the {tier} tier")]
    PayloadTooLarge {
        tier: ModelTier,
        size: usize,
        limit: usize,
    },

    // ── Model errors ──────────────────────────────────────────────────────
    /// Any failure from a hosted model call: transport, provider error,
    /// timeout or an unusable reply.
    #[error("{tier} model call failed: {message}")]
    ModelCall { tier: ModelTier, message: String },

    /// The fallback loop ran out of attempts with fields still missing.
    #[error("Extraction incomplete after {attempts} attempts; missing fields: {}", join_fields(.missing))]
    IncompleteExtraction {
        missing: Vec<KycField>,
        attempts: u32,
    },

    /// The configured provider could not be created (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write the JSON result file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl KycError {
    /// Whether retrying the same operation might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KycError::TransientFetch { .. } | KycError::ModelCall { .. }
        )
    }

    pub(crate) fn model(tier: ModelTier, message: impl Into<String>) -> Self {
        KycError::ModelCall {
            tier,
            message: message.into(),
        }
    }
}

/// The three hosted-model tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Primary structured extraction.
    Ocr,
    /// Secondary free-text extraction of missing fields.
    Visual,
    /// Text-only structuring of the visual reply.
    Reasoning,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelTier::Ocr => "OCR",
            ModelTier::Visual => "visual",
            ModelTier::Reasoning => "reasoning",
        })
    }
}

fn join_fields(fields: &[KycField]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
