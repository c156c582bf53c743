//! Primary extraction: one OCR-tier call producing the first-pass record.

use crate::error::{KycError, ModelTier};
use crate::model::{ModelClient, ModelRequest};
use crate::output::ExtractionStats;
use crate::pipeline::encode::EncodedImage;
use crate::pipeline::postprocess::parse_json_object;
use crate::prompts::OCR_EXTRACTION_PROMPT;
use crate::record::ExtractionRecord;
use crate::retry::RetryPolicy;
use tracing::{debug, info};

/// Run the OCR tier against an encoded image.
///
/// `image_bytes` is the raw (pre-base64) size; it is checked against
/// `max_bytes` before any request is sent. Each call, including reply
/// parsing, runs under `policy`, so a reply that is not a JSON object is
/// retried like a transport failure.
pub async fn extract_primary(
    client: &dyn ModelClient,
    image: &EncodedImage,
    image_bytes: usize,
    max_bytes: usize,
    policy: &RetryPolicy,
    stats: &mut ExtractionStats,
) -> Result<ExtractionRecord, KycError> {
    if image_bytes > max_bytes {
        return Err(KycError::PayloadTooLarge {
            tier: ModelTier::Ocr,
            size: image_bytes,
            limit: max_bytes,
        });
    }

    let (record, reply) = policy
        .run("ocr extraction", |attempt| async move {
            debug!("OCR call attempt {}", attempt);
            let request = ModelRequest::with_image(OCR_EXTRACTION_PROMPT, image.ocr_part());
            let reply = client.complete(request).await?;
            let value = parse_json_object(&reply.content, ModelTier::Ocr)?;
            let record = ExtractionRecord::from_json(value, ModelTier::Ocr)?;
            Ok((record, reply))
        })
        .await?;

    stats.record_reply(&reply);
    info!("OCR extraction returned {} fields", record.len());
    debug!("OCR record: {:?}", record);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImagePart, ModelReply};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<Vec<Result<ModelReply, KycError>>>,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<ModelReply, KycError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelClient for Scripted {
        async fn complete(&self, request: ModelRequest) -> Result<ModelReply, KycError> {
            self.requests.lock().unwrap().push(request);
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn image() -> EncodedImage {
        EncodedImage {
            data: "QUJD".into(),
            mime_type: "image/jpeg".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_image_fails_before_any_call() {
        let client = Scripted::new(vec![]);
        let mut stats = ExtractionStats::default();
        let err = extract_primary(
            &client,
            &image(),
            33 * 1024 * 1024,
            32 * 1024 * 1024,
            &RetryPolicy::default(),
            &mut stats,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, KycError::PayloadTooLarge { tier: ModelTier::Ocr, .. }));
        assert!(client.requests.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_reply_is_retried() {
        let client = Scripted::new(vec![
            Ok(ModelReply::new("Sorry, I cannot read that.")),
            Ok(ModelReply::new(r#"```json
{"name": "Jane Doe", "document_id": "123456789"}
```"#)),
        ]);
        let mut stats = ExtractionStats::default();
        let record =
            extract_primary(&client, &image(), 3, 1024, &RetryPolicy::default(), &mut stats)
                .await
                .unwrap();
        assert_eq!(record.get("name"), Some("Jane Doe"));
        assert_eq!(stats.model_calls, 1);

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].image,
            Some(ImagePart::Url("data:image/jpeg;base64,QUJD#transform=inline".into()))
        );
        assert_eq!(requests[0].prompt, OCR_EXTRACTION_PROMPT);
    }
}
