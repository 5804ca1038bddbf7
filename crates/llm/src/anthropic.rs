//! Anthropic Messages API generator.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{Generator, GeneratorError, RetryPolicy};
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::LlmConfig;

const API_VERSION: &str = "2023-06-01";

/// Longest error body kept in a [`GeneratorError::Status`].
const ERROR_BODY_LIMIT: usize = 2_000;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: [ApiMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

fn build_request<'a>(
    config: &'a LlmConfig,
    system: &'a str,
    prompt: &'a str,
) -> MessagesRequest<'a> {
    MessagesRequest {
        model: &config.model,
        max_tokens: config.max_tokens,
        system,
        messages: [ApiMessage {
            role: "user",
            content: prompt,
        }],
    }
}

/// Concatenates the text blocks of a successful response.
fn extract_text(body: &str) -> Result<String, GeneratorError> {
    let response: MessagesResponse =
        serde_json::from_str(body).map_err(|e| GeneratorError::Decode {
            message: e.to_string(),
        })?;
    if response.stop_reason.as_deref() == Some("max_tokens") {
        warn!("Generator response was cut off at the max_tokens limit");
    }
    let text: String = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(text),
            ResponseBlock::Other => None,
        })
        .collect();
    if text.trim().is_empty() {
        return Err(GeneratorError::Decode {
            message: "response contained no text content".into(),
        });
    }
    Ok(text)
}

/// Parses a `retry-after` header given in whole seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`Generator`] backed by the Anthropic Messages API.
///
/// Retryable failures ([`GeneratorError::retry_policy`]) are retried up to
/// `max_retries` times, honouring `retry-after` when present and otherwise
/// backing off exponentially. The pipeline core never sees those retries.
pub struct AnthropicGenerator {
    client: Client,
    api_key: String,
    config: LlmConfig,
}

impl AnthropicGenerator {
    pub fn new(config: LlmConfig) -> Result<Self, GeneratorError> {
        let api_key = config.resolve_api_key()?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GeneratorError::Configuration {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_once(&self, system: &str, prompt: &str) -> Result<String, GeneratorError> {
        let url = format!("{}/messages", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&build_request(&self.config, system, prompt))
            .send()
            .await
            .map_err(|e| GeneratorError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response
            .text()
            .await
            .map_err(|e| GeneratorError::Transport {
                message: e.to_string(),
            })?;

        if !status.is_success() {
            return Err(GeneratorError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
                retry_after,
            });
        }
        extract_text(&body)
    }
}

#[async_trait]
impl Generator for AnthropicGenerator {
    #[instrument(name = "llm.generate", skip_all, fields(model = %self.config.model))]
    async fn generate(&self, system_context: &str, prompt: &str) -> Result<String, GeneratorError> {
        let mut retry = 0;
        loop {
            match self.send_once(system_context, prompt).await {
                Ok(text) => {
                    debug!(chars = text.len(), retries = retry, "Generator call succeeded");
                    return Ok(text);
                }
                Err(error) => match error.retry_policy() {
                    RetryPolicy::Retryable { after } if retry < self.config.max_retries => {
                        let delay = after.unwrap_or_else(|| self.config.backoff_delay(retry));
                        warn!(
                            %error,
                            retry = retry + 1,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "Retryable generator failure; backing off"
                        );
                        tokio::time::sleep(delay).await;
                        retry += 1;
                    }
                    _ => return Err(error),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_has_messages_api_shape() {
        let config = LlmConfig {
            model: "claude-test".into(),
            max_tokens: 512,
            ..LlmConfig::default()
        };
        let value =
            serde_json::to_value(build_request(&config, "You are the architect.", "Plan it."))
                .unwrap();
        assert_eq!(
            value,
            json!({
                "model": "claude-test",
                "max_tokens": 512,
                "system": "You are the architect.",
                "messages": [{"role": "user", "content": "Plan it."}]
            })
        );
    }

    #[test]
    fn empty_system_is_omitted() {
        let config = LlmConfig::default();
        let value = serde_json::to_value(build_request(&config, "", "hi")).unwrap();
        assert!(value.get("system").is_none());
    }

    #[test]
    fn text_blocks_are_concatenated() {
        let body = json!({
            "id": "msg_1",
            "type": "message",
            "content": [
                {"type": "text", "text": "{\"passed\": "},
                {"type": "tool_use", "id": "t1", "name": "noop", "input": {}},
                {"type": "text", "text": "true}"}
            ],
            "stop_reason": "end_turn"
        })
        .to_string();
        assert_eq!(extract_text(&body).unwrap(), "{\"passed\": true}");
    }

    #[test]
    fn response_without_text_is_a_decode_error() {
        let body = json!({"content": [], "stop_reason": "end_turn"}).to_string();
        assert!(matches!(
            extract_text(&body),
            Err(GeneratorError::Decode { .. })
        ));
        assert!(matches!(
            extract_text("<html>bad gateway</html>"),
            Err(GeneratorError::Decode { .. })
        ));
    }

    #[test]
    fn retry_after_seconds_are_parsed() {
        assert_eq!(parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn rate_limit_is_retryable_with_hint() {
        let error = GeneratorError::Status {
            status: 429,
            body: String::new(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(
            error.retry_policy(),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(3))
            }
        );
    }
}
