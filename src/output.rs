//! Result types returned by the extraction entry points.

use crate::model::ModelReply;
use crate::record::{DocumentType, ExtractionRecord, KycInfo};
use serde::{Deserialize, Serialize};

/// Everything a successful extraction produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// The six finalised fields.
    pub kyc: KycInfo,
    /// Document type derived from `document_id`.
    pub document_type: DocumentType,
    /// The merged record, including any extra keys the models returned.
    pub record: ExtractionRecord,
    pub stats: ExtractionStats,
}

/// Timing and usage for one extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Size of the acquired image.
    pub image_bytes: usize,
    /// Fallback attempts used; 0 when the primary extraction was complete.
    pub fallback_attempts: u32,
    /// Successful model calls across all tiers.
    pub model_calls: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub acquire_duration_ms: u64,
    pub ocr_duration_ms: u64,
    pub fallback_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl ExtractionStats {
    /// Account for one successful model reply.
    pub fn record_reply(&mut self, reply: &ModelReply) {
        self.model_calls += 1;
        self.prompt_tokens += reply.prompt_tokens as u64;
        self.completion_tokens += reply.completion_tokens as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_reply_accumulates() {
        let mut stats = ExtractionStats::default();
        let reply = ModelReply {
            content: "{}".into(),
            prompt_tokens: 100,
            completion_tokens: 20,
        };
        stats.record_reply(&reply);
        stats.record_reply(&reply);
        assert_eq!(stats.model_calls, 2);
        assert_eq!(stats.prompt_tokens, 200);
        assert_eq!(stats.completion_tokens, 40);
    }
}
