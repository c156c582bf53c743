//! Image acquisition: fetch document bytes from a URL or a local path.
//!
//! Downloads are retried with the configured [`crate::retry::RetryPolicy`]
//! (transient errors only by default). A timeout, a dropped connection, a
//! 5xx or a 429 is transient; any other non-success status and a
//! non-`image/*` content type are not. Nothing is cached: every call goes to
//! the network.

use crate::config::ExtractionConfig;
use crate::error::{KycError, ModelTier};
use crate::pipeline::encode::sniff_mime;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Raw document image plus its content type.
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentImage {
    pub bytes: Vec<u8>,
    /// Declared (HTTP) or sniffed (local file) content type.
    pub content_type: String,
    /// Where the image came from, for logs.
    pub source: String,
}

impl std::fmt::Debug for DocumentImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentImage")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("content_type", &self.content_type)
            .field("source", &self.source)
            .finish()
    }
}

impl DocumentImage {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
            source: source.into(),
        }
    }

    /// Wrap in-memory bytes, sniffing the content type.
    pub fn from_bytes(bytes: Vec<u8>, source: impl Into<String>) -> Result<Self, KycError> {
        let source = source.into();
        let content_type = sniff_mime(&bytes).ok_or_else(|| KycError::ContentType {
            source_ref: source.clone(),
            content_type: "unknown".to_string(),
        })?;
        Ok(Self::new(bytes, content_type, source))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Acquire the document image named by `source`.
pub async fn acquire(source: &str, config: &ExtractionConfig) -> Result<DocumentImage, KycError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(KycError::InvalidInput {
            input: source.to_string(),
        });
    }

    let image = if is_url(source) {
        download(source, config).await?
    } else {
        read_local(source).await?
    };

    if image.len() > config.max_ocr_bytes {
        return Err(KycError::PayloadTooLarge {
            tier: ModelTier::Ocr,
            size: image.len(),
            limit: config.max_ocr_bytes,
        });
    }

    info!(
        "Acquired image from {}: {:.2} MB ({})",
        source,
        image.len() as f64 / (1024.0 * 1024.0),
        image.content_type
    );
    Ok(image)
}

async fn read_local(path_str: &str) -> Result<DocumentImage, KycError> {
    let path = PathBuf::from(path_str);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(KycError::FileNotFound { path });
        }
        Err(e) => {
            return Err(KycError::Internal(format!(
                "Failed to read '{}': {}",
                path.display(),
                e
            )))
        }
    };
    debug!("Read local image: {}", path.display());
    DocumentImage::from_bytes(bytes, path_str)
}

async fn download(url: &str, config: &ExtractionConfig) -> Result<DocumentImage, KycError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.fetch_timeout_secs))
        .build()
        .map_err(|e| KycError::Internal(format!("HTTP client: {e}")))?;

    config
        .fetch_retry
        .run("download", |attempt| {
            let client = client.clone();
            async move {
                info!("Downloading image from {} (attempt {})", url, attempt);
                fetch_once(&client, url, config.max_ocr_bytes).await
            }
        })
        .await
}

async fn fetch_once(
    client: &reqwest::Client,
    url: &str,
    max_bytes: usize,
) -> Result<DocumentImage, KycError> {
    let transient = |e: reqwest::Error| KycError::TransientFetch {
        url: url.to_string(),
        reason: if e.is_timeout() {
            format!("timed out: {e}")
        } else {
            e.to_string()
        },
    };

    let response = client.get(url).send().await.map_err(transient)?;

    let status = response.status();
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(KycError::TransientFetch {
            url: url.to_string(),
            reason: format!("HTTP {status}"),
        });
    }
    if !status.is_success() {
        return Err(KycError::FetchFailed {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim()
        .to_string();
    if !content_type.to_ascii_lowercase().starts_with("image/") {
        return Err(KycError::ContentType {
            source_ref: url.to_string(),
            content_type,
        });
    }

    if let Some(len) = response.content_length() {
        if len as usize > max_bytes {
            return Err(KycError::PayloadTooLarge {
                tier: ModelTier::Ocr,
                size: len as usize,
                limit: max_bytes,
            });
        }
    }

    let bytes = response.bytes().await.map_err(transient)?;
    Ok(DocumentImage::new(bytes.to_vec(), content_type, url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/id.jpg"));
        assert!(is_url("http://example.com/id.jpg"));
        assert!(!is_url("/tmp/id.jpg"));
        assert!(!is_url("id.jpg"));
        assert!(!is_url(""));
    }

    #[test]
    fn from_bytes_rejects_non_images() {
        let err = DocumentImage::from_bytes(b"%PDF-1.7".to_vec(), "doc.pdf").unwrap_err();
        assert!(matches!(err, KycError::ContentType { .. }));
    }

    #[test]
    fn debug_hides_bytes() {
        let image = DocumentImage::new(vec![0; 2048], "image/png", "a.png");
        let dbg = format!("{image:?}");
        assert!(dbg.contains("<2048 bytes>"));
    }

    #[tokio::test]
    async fn missing_local_file() {
        let config = ExtractionConfig::default();
        let err = acquire("/definitely/not/here.jpg", &config).await.unwrap_err();
        assert!(matches!(err, KycError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn blank_source_is_invalid() {
        let config = ExtractionConfig::default();
        let err = acquire("   ", &config).await.unwrap_err();
        assert!(matches!(err, KycError::InvalidInput { .. }));
    }
}
