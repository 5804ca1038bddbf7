//! Generator client configuration.

use std::time::Duration;

use pipeline::GeneratorError;
use serde::{Deserialize, Serialize};

/// Environment variable consulted when no API key is configured explicitly.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Settings for [`crate::AnthropicGenerator`], read from the `[llm]` section
/// of `flywheel.toml`.
///
/// The API key is normally left out of the file and taken from
/// `ANTHROPIC_API_KEY`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub base_url: String,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
    /// Client-side retries for retryable failures (transport errors, 429, 5xx).
    pub max_retries: u32,
    /// First back-off delay; doubled on every further retry.
    pub backoff_base_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 8_192,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 180,
            max_retries: 2,
            backoff_base_ms: 1_000,
        }
    }
}

impl LlmConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The configured key, falling back to `ANTHROPIC_API_KEY`.
    pub fn resolve_api_key(&self) -> Result<String, GeneratorError> {
        let key = match &self.api_key {
            Some(key) => key.clone(),
            None => std::env::var(API_KEY_ENV).map_err(|_| GeneratorError::Configuration {
                message: format!("{API_KEY_ENV} environment variable not set"),
            })?,
        };
        if key.trim().is_empty() {
            return Err(GeneratorError::Configuration {
                message: "API key is empty".into(),
            });
        }
        Ok(key)
    }

    /// Delay before retry number `retry` (0-based) when the provider gave no
    /// `retry-after`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .finish()
    }
}
