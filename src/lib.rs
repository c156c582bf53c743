//! # kyc-extract
//!
//! Extract identity fields from photos of passports and driving licences
//! using Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! A single vision call reads most documents correctly, but glare, cropping
//! and unusual layouts regularly leave a field or two unread. Rather than
//! accept a partial result or re-run the whole extraction, this crate checks
//! the first-pass record against the rules for the document type and asks a
//! cheaper model chain for exactly the fields that are still missing, a
//! bounded number of times.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image URL / path
//!  │
//!  ├─ 1. Acquire   download (retry + jitter on transient failures) or read file
//!  ├─ 2. Encode    bytes → base64 with the declared MIME type
//!  ├─ 3. OCR       structured JSON from the primary vision model (≤ 32 MiB)
//!  ├─ 4. Validate  which required fields are missing for this document type
//!  ├─ 5. Fallback  visual read → reasoning model → merge, at most 3 rounds (≤ 5 MiB)
//!  └─ 6. Output    six-field KycInfo + merged record + per-run stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kyc_extract::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let output = extract("https://example.com/licence.jpg", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.kyc)?);
//!     eprintln!("{} model calls, {} fallback attempts",
//!         output.stats.model_calls,
//!         output.stats.fallback_attempts);
//!     Ok(())
//! }
//! ```
//!
//! ## Document rules
//!
//! A `document_id` of exactly nine characters is a passport; anything else
//! is a driving licence. Every document needs `name`, `dob`, `document_id`,
//! `expiry_date` and `issuing_state`; driving licences also need `address`.
//! A value of `"NA"` (or empty) counts as missing.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `kyc-extract` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! kyc-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod retry;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, MAX_OCR_BYTES, MAX_VISUAL_BYTES};
pub use error::{KycError, ModelTier};
pub use extract::{
    extract, extract_from_bytes, extract_many, extract_sync, extract_to_file, extract_with,
    resolve_models, ModelSet,
};
pub use model::{ImagePart, LlmModelClient, ModelClient, ModelReply, ModelRequest};
pub use output::{ExtractionOutput, ExtractionStats};
pub use pipeline::acquire::DocumentImage;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use record::{DocumentType, ExtractionRecord, KycField, KycInfo};
pub use retry::{RetryOn, RetryPolicy};
pub use validate::{validate, MissingFieldSet};
