//! Top-level extraction entry points.
//!
//! [`extract`] runs one document through the four pipeline stages strictly
//! in sequence. [`extract_many`] runs independent documents concurrently;
//! they share only the read-only model clients.

use crate::config::ExtractionConfig;
use crate::error::{KycError, ModelTier};
use crate::model::{LlmModelClient, ModelClient};
use crate::output::{ExtractionOutput, ExtractionStats};
use crate::pipeline::acquire::{self, DocumentImage};
use crate::pipeline::encode::encode_image;
use crate::pipeline::fallback::FallbackResolver;
use crate::pipeline::ocr::extract_primary;
use crate::progress::Stage;
use crate::record::KycInfo;
use crate::validate::validate;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// The three model clients a pipeline run needs.
#[derive(Clone)]
pub struct ModelSet {
    pub ocr: Arc<dyn ModelClient>,
    pub visual: Arc<dyn ModelClient>,
    pub reasoning: Arc<dyn ModelClient>,
}

/// Extract KYC fields from an image URL or local path.
///
/// # Errors
/// Any [`KycError`]: acquisition failures, oversized images, model failures
/// that survived their retries, or [`KycError::IncompleteExtraction`] when
/// the fallback budget runs out.
pub async fn extract(
    source: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, KycError> {
    let models = resolve_models(config)?;
    extract_with(source.as_ref(), &models, config).await
}

/// Extract from image bytes already in memory.
pub async fn extract_from_bytes(
    bytes: Vec<u8>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, KycError> {
    let image = DocumentImage::from_bytes(bytes, "<memory>")?;
    let models = resolve_models(config)?;
    let mut stats = ExtractionStats::default();
    let result = process_image(image, &models, config, &mut stats, Instant::now()).await;
    notify_complete(config, "<memory>", &result);
    result
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    source: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, KycError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| KycError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(source, config))
}

/// Extract and write the six-field JSON object to `output_path`.
///
/// Uses atomic write (temp file + rename) so a failed run never leaves a
/// partial file behind.
pub async fn extract_to_file(
    source: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, KycError> {
    let output = extract(source, config).await?;
    let path = output_path.as_ref();
    let write_err = |e: std::io::Error| KycError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let json = serde_json::to_string_pretty(&output.kyc)
        .map_err(|e| KycError::Internal(format!("serialise result: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, format!("{json}\n"))
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    Ok(output)
}

/// Extract several documents concurrently.
///
/// At most `config.concurrency` pipelines run at once. Results come back in
/// input order, one per source; a failure in one document does not affect
/// the others.
pub async fn extract_many<S: AsRef<str>>(
    sources: &[S],
    config: &ExtractionConfig,
) -> Vec<Result<ExtractionOutput, KycError>> {
    let models = match resolve_models(config) {
        Ok(models) => models,
        Err(e) => {
            let msg = e.to_string();
            return sources
                .iter()
                .map(|_| {
                    Err(KycError::ProviderNotConfigured {
                        provider: config.provider_name.clone().unwrap_or_else(|| "auto".into()),
                        hint: msg.clone(),
                    })
                })
                .collect();
        }
    };

    let models = &models;
    stream::iter(sources.iter().map(AsRef::<str>::as_ref))
        .map(|source| async move { extract_with(source, models, config).await })
        .buffered(config.concurrency.max(1))
        .collect()
        .await
}

/// Run one document through the pipeline with already-resolved models.
pub async fn extract_with(
    source: &str,
    models: &ModelSet,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, KycError> {
    let total_start = Instant::now();
    info!("Starting extraction: {}", source);
    let mut stats = ExtractionStats::default();

    let result = async {
        // ── Step 1: Acquire image ────────────────────────────────────────
        stage(config, source, Stage::Acquire);
        let acquire_start = Instant::now();
        let image = acquire::acquire(source, config).await?;
        stats.acquire_duration_ms = elapsed_ms(acquire_start);

        process_image(image, models, config, &mut stats, total_start).await
    }
    .await;

    notify_complete(config, source, &result);
    result
}

/// Steps 2–6, shared by URL, path and in-memory inputs.
async fn process_image(
    image: DocumentImage,
    models: &ModelSet,
    config: &ExtractionConfig,
    stats: &mut ExtractionStats,
    total_start: Instant,
) -> Result<ExtractionOutput, KycError> {
    let source = image.source.clone();
    stats.image_bytes = image.len();

    // ── Step 2: Encode ───────────────────────────────────────────────────
    let encoded = encode_image(&image);

    // ── Step 3: Primary extraction ───────────────────────────────────────
    stage(config, &source, Stage::Ocr);
    let ocr_start = Instant::now();
    let record = extract_primary(
        models.ocr.as_ref(),
        &encoded,
        image.len(),
        config.max_ocr_bytes,
        &config.model_retry,
        stats,
    )
    .await?;
    stats.ocr_duration_ms = elapsed_ms(ocr_start);

    // ── Step 4: Validate ─────────────────────────────────────────────────
    stage(config, &source, Stage::Validate);
    let missing = validate(&record);
    info!("Fields missing after OCR extraction: {}", missing);

    // ── Step 5: Fallback ─────────────────────────────────────────────────
    let record = if missing.is_empty() {
        record
    } else {
        stage(config, &source, Stage::Fallback);
        let fallback_start = Instant::now();
        let resolver = FallbackResolver {
            visual: models.visual.as_ref(),
            reasoning: models.reasoning.as_ref(),
            policy: &config.model_retry,
            max_attempts: config.max_fallback_attempts,
            max_visual_bytes: config.max_visual_bytes,
            progress: config.progress_callback.as_ref(),
        };
        let resolved = resolver
            .resolve(record, missing, &encoded, image.len(), &source, stats)
            .await?;
        stats.fallback_attempts = resolved.attempts;
        stats.fallback_duration_ms = elapsed_ms(fallback_start);
        resolved.record
    };

    // ── Step 6: Finalise ─────────────────────────────────────────────────
    let kyc = KycInfo::try_from(&record)?;
    let document_type = record
        .document_type()
        .ok_or_else(|| KycError::Internal("validated record has no document_id".into()))?;
    stats.total_duration_ms = elapsed_ms(total_start);

    info!(
        "Extraction complete: {:?}, {} model calls, {} fallback attempts, {}ms",
        document_type, stats.model_calls, stats.fallback_attempts, stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        kyc,
        document_type,
        record,
        stats: stats.clone(),
    })
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Build the three model clients, from most-specific to least-specific:
///
/// 1. **Pre-built client** for the tier (`config.ocr_client` etc.).
/// 2. **Named provider** (`config.provider_name`) with the tier's model.
/// 3. **`KYC_PROVIDER` environment variable** with the tier's model.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`], which uses
///    the detected provider's default model for every tier.
pub fn resolve_models(config: &ExtractionConfig) -> Result<ModelSet, KycError> {
    Ok(ModelSet {
        ocr: resolve_tier(config, ModelTier::Ocr)?,
        visual: resolve_tier(config, ModelTier::Visual)?,
        reasoning: resolve_tier(config, ModelTier::Reasoning)?,
    })
}

fn resolve_tier(
    config: &ExtractionConfig,
    tier: ModelTier,
) -> Result<Arc<dyn ModelClient>, KycError> {
    let (prebuilt, model) = match tier {
        ModelTier::Ocr => (&config.ocr_client, &config.ocr_model),
        ModelTier::Visual => (&config.visual_client, &config.visual_model),
        ModelTier::Reasoning => (&config.reasoning_client, &config.reasoning_model),
    };
    if let Some(client) = prebuilt {
        return Ok(Arc::clone(client));
    }

    let provider = resolve_provider(config.provider_name.as_deref(), model)?;
    debug!("Using model '{}' for the {} tier", model, tier);
    let client = LlmModelClient::new(provider, tier)
        .temperature(config.temperature)
        .max_tokens(config.max_tokens)
        .timeout(Duration::from_secs(config.api_timeout_secs));
    Ok(Arc::new(client))
}

fn resolve_provider(
    provider_name: Option<&str>,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, KycError> {
    if let Some(name) = provider_name {
        return create_provider(name, model);
    }

    if let Ok(name) = std::env::var("KYC_PROVIDER") {
        if !name.is_empty() {
            return create_provider(&name, model);
        }
    }

    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| KycError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or KYC_PROVIDER.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(llm_provider)
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, KycError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        KycError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn stage(config: &ExtractionConfig, source: &str, stage: Stage) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(source, stage);
    }
}

fn notify_complete(
    config: &ExtractionConfig,
    source: &str,
    result: &Result<ExtractionOutput, KycError>,
) {
    if let Some(ref cb) = config.progress_callback {
        let err = result.as_ref().err().map(|e| e.to_string());
        cb.on_extraction_complete(source, err.as_deref());
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
