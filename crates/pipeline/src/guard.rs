//! Schema guard: turns free-form generator text into a typed contract value,
//! with bounded self-correction.
//!
//! ## Algorithm
//!
//! 1. Extract a JSON payload ([`extract_payload`]): the first fenced block
//!    whose body looks like JSON, else the whole trimmed text.
//! 2. Parse it. Failure → "output was not valid JSON".
//! 3. Check the contract's [`crate::schema::Schema`], collecting every violation,
//!    then deserialise and apply the contract's cross-field rules.
//! 4. On success return immediately; the first-attempt success path makes no
//!    further generator call.
//! 5. On failure, while correction rounds remain, send the generator a
//!    correction request (diagnostic + truncated previous response + original
//!    task) and repeat from step 1 with its answer.
//! 6. When rounds are exhausted, fail with [`GuardError::Exhausted`] carrying
//!    the last diagnostic.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::contracts::Contract;
use crate::errors::GeneratorError;
use crate::schema::Violation;
use crate::ports::Generator;

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    // Opening fence, optional language tag, body (lazy), closing fence.
    Regex::new(r"(?s)```[A-Za-z0-9_+.-]*[ \t]*\r?\n?(.*?)```").expect("fence pattern is valid")
});

/// Locates the JSON payload inside raw generator text.
///
/// Returns the body of the first fenced code block (with or without a
/// language tag) whose trimmed content starts with `{` or `[`. When there is
/// no such block, the whole trimmed input is returned.
///
/// Fences are found by pattern, not by parsing: an object whose string values
/// themselves contain a fence (a generated README, say) is cut at that inner
/// fence. The fragment then fails validation and goes through self-correction.
pub fn extract_payload(raw: &str) -> &str {
    FENCED_BLOCK
        .captures_iter(raw)
        .filter_map(|captures| captures.get(1))
        .map(|body| body.as_str().trim())
        .find(|body| body.starts_with('{') || body.starts_with('['))
        .unwrap_or_else(|| raw.trim())
}

// ---------------------------------------------------------------------------
// Single-attempt validation
// ---------------------------------------------------------------------------

/// Why one attempt failed validation. Recoverable through self-correction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("output was not valid JSON ({detail})")]
    NotJson { detail: String },

    #[error("output did not satisfy the {contract} contract:\n{}", render_violations(.violations))]
    Contract {
        contract: &'static str,
        violations: Vec<Violation>,
    },
}

fn render_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("- {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Validates raw generator text against contract `T` without any generator
/// round-trip.
pub fn validate<T: Contract>(raw: &str) -> Result<T, ValidationFailure> {
    let payload = extract_payload(raw);

    let value: Value = serde_json::from_str(payload).map_err(|e| ValidationFailure::NotJson {
        detail: e.to_string(),
    })?;

    let violations = T::schema().check(&value);
    if !violations.is_empty() {
        return Err(ValidationFailure::Contract {
            contract: T::NAME,
            violations,
        });
    }

    // The schema admits every shape the typed target accepts, so a failure
    // here means the two have drifted; it is still reported, never panicked on.
    let typed: T = serde_json::from_value(value).map_err(|e| ValidationFailure::Contract {
        contract: T::NAME,
        violations: vec![Violation::new("(root)", e.to_string())],
    })?;

    let violations = typed.check();
    if !violations.is_empty() {
        return Err(ValidationFailure::Contract {
            contract: T::NAME,
            violations,
        });
    }
    Ok(typed)
}

// ---------------------------------------------------------------------------
// Self-correction
// ---------------------------------------------------------------------------

/// Fatal outcome of [`SchemaGuard::validate_with_correction`].
#[derive(Debug, Error)]
pub enum GuardError {
    /// A correction call to the generator failed outright.
    #[error(transparent)]
    Generator(#[from] GeneratorError),

    /// Every attempt failed validation.
    #[error("{contract} output still invalid after {attempts} attempt(s): {diagnostic}")]
    Exhausted {
        contract: &'static str,
        attempts: u32,
        diagnostic: ValidationFailure,
    },
}

/// What the guard needs to ask the generator for a correction.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionContext<'a> {
    /// System context used for the original call; reused for corrections.
    pub system_context: &'a str,
    /// The original task prompt.
    pub task: &'a str,
    /// Characters of the previous invalid response to echo back.
    pub previous_response_limit: usize,
}

/// Validates generator output and drives bounded self-correction.
pub struct SchemaGuard<'a> {
    generator: &'a dyn Generator,
}

impl<'a> SchemaGuard<'a> {
    pub fn new(generator: &'a dyn Generator) -> Self {
        Self { generator }
    }

    /// Validates `raw` against `T`, re-invoking the generator at most
    /// `max_retries` times with a structured diagnostic.
    ///
    /// Total attempts are `max_retries + 1`; on exhaustion exactly
    /// `max_retries` generator calls have been made by this method.
    pub async fn validate_with_correction<T: Contract>(
        &self,
        raw: String,
        context: &CorrectionContext<'_>,
        max_retries: u32,
    ) -> Result<T, GuardError> {
        let mut raw = raw;
        let mut attempt: u32 = 1;
        loop {
            let failure = match validate::<T>(&raw) {
                Ok(value) => {
                    debug!(contract = T::NAME, attempt, "Generator output validated");
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            warn!(
                contract = T::NAME,
                attempt,
                max_attempts = max_retries + 1,
                diagnostic = %failure,
                "Generator output failed validation"
            );

            if attempt > max_retries {
                return Err(GuardError::Exhausted {
                    contract: T::NAME,
                    attempts: attempt,
                    diagnostic: failure,
                });
            }

            let request = correction_prompt::<T>(&failure, &raw, context);
            raw = self
                .generator
                .generate(context.system_context, &request)
                .await?;
            attempt += 1;
        }
    }
}

/// Builds the correction request sent after a failed attempt.
pub fn correction_prompt<T: Contract>(
    failure: &ValidationFailure,
    previous: &str,
    context: &CorrectionContext<'_>,
) -> String {
    format!(
        "Your previous response could not be accepted.\n\n\
         ## Problem\n{failure}\n\n\
         ## Your previous response\n{previous}\n\n\
         ## Original task\n{task}\n\n\
         Respond again with only a JSON object matching the {contract} contract:\n{hint}",
        previous = truncate_chars(previous, context.previous_response_limit),
        task = context.task,
        contract = T::NAME,
        hint = T::shape_hint(),
    )
}

/// Truncates to at most `limit` characters, on a character boundary.
fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        None => text.to_string(),
        Some((cut, _)) => format!(
            "{}\n[... truncated {} characters]",
            &text[..cut],
            text[cut..].chars().count()
        ),
    }
}
