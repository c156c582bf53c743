//! Pipeline stages for KYC extraction.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own with fake model clients.
//!
//! ## Data Flow
//!
//! ```text
//! acquire ──▶ encode ──▶ ocr ──▶ validate ──▶ fallback
//! (URL/path)  (base64)   (VLM)   (rules)      (VLM + reasoning, ≤3×)
//! ```
//!
//! 1. [`acquire`]  : fetch the image bytes, retrying transient failures
//! 2. [`encode`]   : base64-wrap the bytes and pick the MIME type to declare
//! 3. [`ocr`]      : first-pass structured extraction
//! 4. [`crate::validate`] : which required fields are still missing
//! 5. [`fallback`] : bounded backfill of exactly the missing fields
//!
//! [`postprocess`] cleans model replies for stages 3 and 5.

pub mod acquire;
pub mod encode;
pub mod fallback;
pub mod ocr;
pub mod postprocess;
