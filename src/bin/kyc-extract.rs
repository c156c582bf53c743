//! CLI binary for kyc-extract.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use kyc_extract::{
    extract, extract_many, extract_to_file, ExtractionConfig, ExtractionOutput,
    ExtractionProgressCallback, MissingFieldSet, ProgressCallback, RetryOn, Stage,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Test image used when no source is given.
const DEFAULT_SOURCE: &str =
    "https://drive.google.com/uc?export=download&id=1OwDlWQ4z0SrNKo1TYRDsYxnc-Ai_-jtl";

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner showing the current stage of each document.
///
/// Documents in a batch finish out of order, so every line names its source.
struct CliProgressCallback {
    bar: ProgressBar,
    failed: AtomicUsize,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {pos}/{len}  {msg}  ⏱ {elapsed}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failed: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
        let total = self.bar.length().unwrap_or(0) as usize;
        let failed = self.failed.load(Ordering::SeqCst);
        if total > 1 {
            eprintln!(
                "{} {}/{} documents extracted",
                if failed == 0 { green("✔") } else { cyan("⚠") },
                total - failed,
                total
            );
        }
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, source: &str, stage: Stage) {
        self.bar.set_message(format!("{}  {}", short(source), stage));
    }

    fn on_fallback_attempt(&self, source: &str, attempt: u32, max: u32, missing: &MissingFieldSet) {
        self.bar.println(format!(
            "  {} {}  fallback {}/{}  {}",
            cyan("↻"),
            short(source),
            attempt,
            max,
            dim(&format!("missing {missing}")),
        ));
    }

    fn on_extraction_complete(&self, source: &str, error: Option<&str>) {
        match error {
            None => self
                .bar
                .println(format!("  {} {}", green("✓"), short(source))),
            Some(e) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                // Truncate very long error messages to keep output tidy.
                let msg: String = if e.chars().count() > 80 {
                    format!("{}\u{2026}", e.chars().take(79).collect::<String>())
                } else {
                    e.to_string()
                };
                self.bar
                    .println(format!("  {} {}  {}", red("✗"), short(source), red(&msg)));
            }
        }
        self.bar.inc(1);
    }
}

/// Last path segment of a source, for one-line status messages.
fn short(source: &str) -> &str {
    let trimmed = source.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, tail)) if !tail.is_empty() => tail,
        _ => trimmed,
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract from the built-in test image
  kyc-extract

  # Extract from a URL or a local photo
  kyc-extract https://example.com/licence.jpg
  kyc-extract ./scans/passport.png --pretty

  # Several documents, one JSON line each
  kyc-extract a.jpg b.jpg c.jpg --concurrency 2

  # Write the result to a file
  kyc-extract licence.jpg -o licence.json

  # Use specific models
  kyc-extract --provider openai --ocr-model gpt-4.1 --vision-model gpt-4.1-mini licence.jpg

OUTPUT:
  A JSON object with exactly the fields name, dob, document_id, expiry_date,
  issuing_state and address (null when the document is a passport and no
  address was found). Logs and progress go to stderr. On failure nothing is
  written to stdout and the exit status is 1.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  KYC_PROVIDER            Override provider (openai, anthropic, gemini, ollama)
  RUST_LOG                Override the log filter

  Every flag can also be set through its KYC_* variable, and a .env file in
  the working directory is loaded on start-up.
"#;

/// Extract KYC fields from identity document images using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "kyc-extract",
    version,
    about = "Extract KYC fields from passport and driving licence images using Vision LLMs",
    long_about = "Extract name, date of birth, document number, expiry date, issuing state \
and address from photos of passports and driving licences. Fields the first model misses are \
backfilled by a visual + reasoning model chain, at most --max-attempts times.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image URLs or local paths. Defaults to a built-in test image.
    sources: Vec<String>,

    /// Write the JSON result to this file instead of stdout (single source only).
    #[arg(short, long, env = "KYC_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "KYC_PROVIDER")]
    provider: Option<String>,

    /// Model for the primary structured extraction.
    #[arg(long, env = "KYC_OCR_MODEL")]
    ocr_model: Option<String>,

    /// Vision model that reads missing fields as free text.
    #[arg(long, env = "KYC_VISION_MODEL")]
    vision_model: Option<String>,

    /// Text model that turns the vision reply into JSON.
    #[arg(long, env = "KYC_REASONING_MODEL")]
    reasoning_model: Option<String>,

    /// Fallback rounds before giving up on missing fields.
    #[arg(long, env = "KYC_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Image download timeout in seconds.
    #[arg(long, env = "KYC_FETCH_TIMEOUT", default_value_t = 30)]
    fetch_timeout: u64,

    /// Per-model-call timeout in seconds.
    #[arg(long, env = "KYC_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Which model-call errors are retried.
    #[arg(long, env = "KYC_RETRY_ON", value_enum, default_value = "any")]
    retry_on: RetryOnArg,

    /// Documents processed at once.
    #[arg(short, long, env = "KYC_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Pretty-print JSON output.
    #[arg(long, env = "KYC_PRETTY")]
    pretty: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "KYC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "KYC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "KYC_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum RetryOnArg {
    Any,
    Retryable,
}

impl From<RetryOnArg> for RetryOn {
    fn from(v: RetryOnArg) -> Self {
        match v {
            RetryOnArg::Any => RetryOn::AnyError,
            RetryOnArg::Retryable => RetryOn::Retryable,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let mut cli = Cli::parse();
    if cli.sources.is_empty() {
        cli.sources.push(DEFAULT_SOURCE.to_string());
    }

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active; it
    // already reports each stage.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(&cli, show_progress).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run the extraction. `Ok(false)` means some documents in a batch failed;
/// those failures have already been logged.
async fn run(cli: &Cli, show_progress: bool) -> Result<bool> {
    let progress = show_progress.then(|| CliProgressCallback::new(cli.sources.len()));
    let config = build_config(
        cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn ExtractionProgressCallback>),
    )?;

    let result = match cli.sources.as_slice() {
        [source] => run_single(cli, source, &config).await.map(|_| true),
        sources => {
            if cli.output.is_some() {
                anyhow::bail!("--output takes a single source, got {}", sources.len());
            }
            run_batch(cli, sources, &config).await
        }
    };

    if let Some(cb) = progress {
        cb.finish();
    }
    result
}

async fn run_single(cli: &Cli, source: &str, config: &ExtractionConfig) -> Result<()> {
    if let Some(ref output_path) = cli.output {
        let output = extract_to_file(source, output_path, config)
            .await
            .with_context(|| format!("Extraction failed for {source}"))?;
        if !cli.quiet {
            summary(&output);
            eprintln!("   →  {}", output_path.display());
        }
        return Ok(());
    }

    let output = extract(source, config)
        .await
        .with_context(|| format!("Extraction failed for {source}"))?;
    print_json(&output, cli.pretty)?;
    if !cli.quiet {
        summary(&output);
    }
    Ok(())
}

async fn run_batch(cli: &Cli, sources: &[String], config: &ExtractionConfig) -> Result<bool> {
    let results = extract_many(sources, config).await;
    let mut all_ok = true;
    for (source, result) in sources.iter().zip(results) {
        match result {
            Ok(output) => print_json(&output, cli.pretty)?,
            Err(e) => {
                all_ok = false;
                error!("Extraction failed for {}: {}", source, e);
            }
        }
    }
    Ok(all_ok)
}

fn print_json(output: &ExtractionOutput, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(&output.kyc)
    } else {
        serde_json::to_string(&output.kyc)
    }
    .context("Failed to serialise output")?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}").context("Failed to write to stdout")?;
    Ok(())
}

fn summary(output: &ExtractionOutput) {
    let stats = &output.stats;
    eprintln!(
        "{}  {:?}  {} model calls  {} fallback attempts  {}ms",
        green("✔"),
        output.document_type,
        stats.model_calls,
        stats.fallback_attempts,
        stats.total_duration_ms,
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&stats.prompt_tokens.to_string()),
        dim(&stats.completion_tokens.to_string()),
    );
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .max_fallback_attempts(cli.max_attempts)
        .fetch_timeout_secs(cli.fetch_timeout)
        .api_timeout_secs(cli.api_timeout)
        .model_retry_on(cli.retry_on.clone().into())
        .concurrency(cli.concurrency);

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref model) = cli.ocr_model {
        builder = builder.ocr_model(model);
    }
    if let Some(ref model) = cli.vision_model {
        builder = builder.visual_model(model);
    }
    if let Some(ref model) = cli.reasoning_model {
        builder = builder.reasoning_model(model);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
