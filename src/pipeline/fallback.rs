//! Fallback resolution: backfill fields the OCR tier left missing.
//!
//! ## State machine
//!
//! ```text
//!                 size check (once)
//! NEEDS_FALLBACK ───────────────────▶ attempt 1..=max
//!                                        │
//!                 visual call ──▶ reasoning call ──▶ merge ──▶ validate
//!                                        │                        │
//!                                        │   missing non-empty    │ empty
//!                                        ◀────────────────────────┤
//!                                        │                        ▼
//!                        budget spent ──▶ FAILED              COMPLETE
//! ```
//!
//! Each attempt asks only for the fields that are still missing, so the
//! prompts shrink as fields are filled in. Merging follows
//! [`ExtractionRecord::merge`]: an `NA` from a later attempt never erases a
//! value an earlier one found.
//!
//! The two calls inside an attempt are retried individually by the model
//! retry policy; an attempt that still fails after those retries aborts the
//! whole resolution with the model error.

use crate::error::{KycError, ModelTier};
use crate::model::{ModelClient, ModelRequest};
use crate::output::ExtractionStats;
use crate::pipeline::encode::EncodedImage;
use crate::pipeline::postprocess::{clean_text, parse_json_object};
use crate::progress::ProgressCallback;
use crate::prompts::{reasoning_prompt, visual_prompt};
use crate::record::ExtractionRecord;
use crate::retry::RetryPolicy;
use crate::validate::{validate, MissingFieldSet};
use tracing::{debug, info, warn};

/// A record the resolver completed, with the attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub record: ExtractionRecord,
    pub attempts: u32,
}

/// Bounded visual + reasoning backfill loop.
pub struct FallbackResolver<'a> {
    pub visual: &'a dyn ModelClient,
    pub reasoning: &'a dyn ModelClient,
    pub policy: &'a RetryPolicy,
    pub max_attempts: u32,
    pub max_visual_bytes: usize,
    pub progress: Option<&'a ProgressCallback>,
}

impl FallbackResolver<'_> {
    /// Resolve `missing` fields of `record` from `image`.
    ///
    /// `image_bytes` is the raw image size, checked once against the visual
    /// ceiling before the first attempt. Returns immediately, without any
    /// model call, if `missing` is already empty.
    pub async fn resolve(
        &self,
        mut record: ExtractionRecord,
        mut missing: MissingFieldSet,
        image: &EncodedImage,
        image_bytes: usize,
        source: &str,
        stats: &mut ExtractionStats,
    ) -> Result<Resolved, KycError> {
        if missing.is_empty() {
            return Ok(Resolved {
                record,
                attempts: 0,
            });
        }

        if image_bytes > self.max_visual_bytes {
            return Err(KycError::PayloadTooLarge {
                tier: ModelTier::Visual,
                size: image_bytes,
                limit: self.max_visual_bytes,
            });
        }

        let mut attempts = 0;
        while attempts < self.max_attempts {
            attempts += 1;
            info!(
                "Fallback attempt {}/{} for missing fields: {}",
                attempts, self.max_attempts, missing
            );
            if let Some(cb) = self.progress {
                cb.on_fallback_attempt(source, attempts, self.max_attempts, &missing);
            }

            let partial = self.attempt(&missing, image, stats).await?;
            let written = record.merge(&partial);
            debug!("Merged fields {:?} from attempt {}", written, attempts);

            missing = validate(&record);
            if missing.is_empty() {
                info!("All fields resolved after {} fallback attempt(s)", attempts);
                return Ok(Resolved { record, attempts });
            }
            info!(
                "Missing fields after fallback attempt {}: {}",
                attempts, missing
            );
        }

        warn!(
            "Extraction still missing {} after {} attempts",
            missing, attempts
        );
        Err(KycError::IncompleteExtraction {
            missing: missing.into_vec(),
            attempts,
        })
    }

    /// One visual → reasoning round trip.
    async fn attempt(
        &self,
        missing: &MissingFieldSet,
        image: &EncodedImage,
        stats: &mut ExtractionStats,
    ) -> Result<ExtractionRecord, KycError> {
        let visual = self.visual;
        let visual_reply = self
            .policy
            .run("visual extraction", |_| async move {
                let request = ModelRequest::with_image(visual_prompt(missing), image.visual_part());
                visual.complete(request).await
            })
            .await?;
        stats.record_reply(&visual_reply);

        let visual_text = clean_text(&visual_reply.content);
        debug!("Visual tier returned: {}", visual_text);

        let reasoning = self.reasoning;
        let prompt = reasoning_prompt(missing, &visual_text);
        let prompt = prompt.as_str();
        let (partial, reasoning_reply) = self
            .policy
            .run("reasoning extraction", |_| async move {
                let reply = reasoning.complete(ModelRequest::text(prompt)).await?;
                let value = parse_json_object(&reply.content, ModelTier::Reasoning)?;
                let partial = ExtractionRecord::from_json(value, ModelTier::Reasoning)?;
                Ok((partial, reply))
            })
            .await?;
        stats.record_reply(&reasoning_reply);

        debug!("Reasoning tier extracted: {:?}", partial);
        Ok(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImagePart, ModelReply};
    use crate::record::KycField;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Visual model that echoes a fixed description and records prompts.
    struct Visual {
        text: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelClient for Visual {
        async fn complete(&self, request: ModelRequest) -> Result<ModelReply, KycError> {
            assert!(matches!(request.image, Some(ImagePart::Base64 { .. })));
            self.prompts.lock().unwrap().push(request.prompt);
            Ok(ModelReply::new(self.text.clone()))
        }
    }

    /// Reasoning model replying from a script, repeating the last entry.
    struct Reasoning {
        replies: Vec<&'static str>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ModelClient for Reasoning {
        async fn complete(&self, request: ModelRequest) -> Result<ModelReply, KycError> {
            assert!(request.image.is_none());
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let reply = self.replies[n.min(self.replies.len() - 1)];
            Ok(ModelReply::new(reply))
        }
    }

    fn visual(text: &str) -> Visual {
        Visual {
            text: text.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn reasoning(replies: Vec<&'static str>) -> Reasoning {
        Reasoning {
            replies,
            calls: AtomicU32::new(0),
        }
    }

    fn image() -> EncodedImage {
        EncodedImage {
            data: "QUJD".into(),
            mime_type: "image/png".into(),
        }
    }

    fn license_without_address() -> ExtractionRecord {
        [
            ("name", "John Doe"),
            ("dob", "01/02/1990"),
            ("document_id", "DL123456"),
            ("expiry_date", "01/02/2030"),
            ("issuing_state", "CA"),
            ("address", "NA"),
        ]
        .into_iter()
        .collect()
    }

    fn resolver<'a>(
        v: &'a Visual,
        r: &'a Reasoning,
        policy: &'a RetryPolicy,
    ) -> FallbackResolver<'a> {
        FallbackResolver {
            visual: v,
            reasoning: r,
            policy,
            max_attempts: 3,
            max_visual_bytes: 5 * 1024 * 1024,
            progress: None,
        }
    }

    #[tokio::test]
    async fn backfills_address_in_one_attempt() {
        let v = visual("Address: 123 Main St");
        let r = reasoning(vec![r#"{"address": "123 Main St"}"#]);
        let policy = RetryPolicy::default();
        let record = license_without_address();
        let missing = validate(&record);
        let mut stats = ExtractionStats::default();

        let resolved = resolver(&v, &r, &policy)
            .resolve(record, missing, &image(), 1024, "test", &mut stats)
            .await
            .unwrap();

        assert_eq!(resolved.attempts, 1);
        assert_eq!(resolved.record.get("address"), Some("123 Main St"));
        assert_eq!(stats.model_calls, 2);
        assert_eq!(
            *v.prompts.lock().unwrap(),
            vec!["Extract the following fields from the document: address".to_string()]
        );
    }

    #[tokio::test]
    async fn gives_up_after_exactly_three_attempts() {
        let v = visual("nothing legible");
        let r = reasoning(vec![r#"{"address": "NA"}"#]);
        let policy = RetryPolicy::default();
        let record = license_without_address();
        let missing = validate(&record);
        let mut stats = ExtractionStats::default();

        let err = resolver(&v, &r, &policy)
            .resolve(record, missing, &image(), 1024, "test", &mut stats)
            .await
            .unwrap_err();

        match err {
            KycError::IncompleteExtraction { missing, attempts } => {
                assert_eq!(attempts, 3);
                assert_eq!(missing, vec![KycField::Address]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(r.calls.load(Ordering::SeqCst), 3);
        assert_eq!(v.prompts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn later_na_does_not_erase_earlier_value() {
        let v = visual("...");
        // First attempt finds the name but not the address; second finds the
        // address and answers NA for everything else.
        let r = reasoning(vec![
            r#"{"name": "John Doe", "address": "NA"}"#,
            r#"{"name": "NA", "address": "9 Elm Rd"}"#,
        ]);
        let policy = RetryPolicy::default();
        let mut record = license_without_address();
        record.insert("name", "");
        let missing = validate(&record);
        assert_eq!(missing.fields(), &[KycField::Name, KycField::Address]);
        let mut stats = ExtractionStats::default();

        let resolved = resolver(&v, &r, &policy)
            .resolve(record, missing, &image(), 1024, "test", &mut stats)
            .await
            .unwrap();

        assert_eq!(resolved.attempts, 2);
        assert_eq!(resolved.record.get("name"), Some("John Doe"));
        assert_eq!(resolved.record.get("address"), Some("9 Elm Rd"));
        // Second visual prompt asks only for what is still missing.
        assert_eq!(
            v.prompts.lock().unwrap()[1],
            "Extract the following fields from the document: address"
        );
    }

    #[tokio::test]
    async fn oversized_image_fails_before_any_call() {
        let v = visual("unused");
        let r = reasoning(vec!["{}"]);
        let policy = RetryPolicy::default();
        let record = license_without_address();
        let missing = validate(&record);
        let mut stats = ExtractionStats::default();

        let err = resolver(&v, &r, &policy)
            .resolve(record, missing, &image(), 6 * 1024 * 1024, "test", &mut stats)
            .await
            .unwrap_err();

        assert!(matches!(err, KycError::PayloadTooLarge { tier: ModelTier::Visual, .. }));
        assert!(v.prompts.lock().unwrap().is_empty());
        assert_eq!(r.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn nothing_missing_means_no_calls() {
        let v = visual("unused");
        let r = reasoning(vec!["{}"]);
        let policy = RetryPolicy::default();
        let mut record = license_without_address();
        record.insert("address", "1 Main St");
        let mut stats = ExtractionStats::default();

        let resolved = resolver(&v, &r, &policy)
            .resolve(
                record.clone(),
                MissingFieldSet::default(),
                &image(),
                10 * 1024 * 1024,
                "test",
                &mut stats,
            )
            .await
            .unwrap();
        assert_eq!(resolved.attempts, 0);
        assert_eq!(resolved.record, record);
        assert_eq!(stats.model_calls, 0);
    }
}
