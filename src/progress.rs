//! Progress-callback trait for per-document extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages. The CLI uses this to
//! drive its spinner; services can forward the events anywhere.
//!
//! # Example
//!
//! ```rust
//! use kyc_extract::{ExtractionConfig, ExtractionProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct StageLogger;
//!
//! impl ExtractionProgressCallback for StageLogger {
//!     fn on_stage_start(&self, source: &str, stage: Stage) {
//!         eprintln!("{source}: {stage}");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(StageLogger))
//!     .build()
//!     .unwrap();
//! ```

use crate::validate::MissingFieldSet;
use std::fmt;
use std::sync::Arc;

/// Pipeline stage reported to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquire,
    Ocr,
    Validate,
    Fallback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Acquire => "acquiring image",
            Stage::Ocr => "primary extraction",
            Stage::Validate => "validating fields",
            Stage::Fallback => "backfilling missing fields",
        })
    }
}

/// Called by the pipeline as it processes a document.
///
/// Implementations must be `Send + Sync` because [`crate::extract_many`]
/// runs several documents concurrently. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, source: &str, stage: Stage) {
        let _ = (source, stage);
    }

    /// Called before each fallback attempt (1-indexed).
    fn on_fallback_attempt(&self, source: &str, attempt: u32, max: u32, missing: &MissingFieldSet) {
        let _ = (source, attempt, max, missing);
    }

    /// Called once per document with the final outcome.
    fn on_extraction_complete(&self, source: &str, error: Option<&str>) {
        let _ = (source, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
