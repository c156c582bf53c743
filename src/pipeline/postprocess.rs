//! Post-processing: deterministic cleanup of model replies.
//!
//! Even when asked for "a single JSON object", models regularly wrap it in
//! ```` ```json ```` fences, prefix it with a sentence, or sprinkle invisible
//! Unicode into free text. These rules fix those quirks before parsing so the
//! retry budget is spent on genuine failures.
//!
//! ## Rule Order
//!
//! Normalise line endings and strip invisible characters first, then strip
//! fences, and only then fall back to scanning for the outermost `{ … }`.

use crate::error::{KycError, ModelTier};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Clean a free-text reply (visual tier) for use inside the next prompt.
pub fn clean_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    s.trim().to_string()
}

/// Parse a reply that should contain one JSON object.
///
/// Tries, in order: the cleaned reply as-is, the body of an outer code fence,
/// and the span from the first `{` to the last `}`. Anything else is a
/// [`KycError::ModelCall`] for `tier`, so the caller's retry policy applies.
pub fn parse_json_object(input: &str, tier: ModelTier) -> Result<Value, KycError> {
    let cleaned = remove_invisible_chars(&normalise_line_endings(input));
    let unfenced = strip_code_fences(cleaned.trim());

    let candidates = [Some(unfenced.as_str()), outer_braces(&unfenced)];
    for candidate in candidates.into_iter().flatten() {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
            return Ok(value);
        }
    }

    Err(KycError::model(
        tier,
        format!("reply is not a JSON object: {}", preview(input)),
    ))
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input) {
        caps[1].trim().to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 5: Outermost braces ─────────────────────────────────────────────────

fn outer_braces(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    (end > start).then(|| &input[start..=end])
}

fn preview(input: &str) -> String {
    const MAX: usize = 120;
    let trimmed = input.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}\u{2026}", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
