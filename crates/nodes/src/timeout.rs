//! Bounded-time generator decorator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{Generator, GeneratorError};
use tracing::warn;

/// Wraps a [`Generator`] so that no single call can stall a run
/// indefinitely. A call exceeding `limit` fails with
/// [`GeneratorError::Timeout`]; the abandoned request is dropped.
pub struct TimeoutGenerator {
    inner: Arc<dyn Generator>,
    limit: Duration,
}

impl TimeoutGenerator {
    pub fn new(inner: Arc<dyn Generator>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl Generator for TimeoutGenerator {
    async fn generate(&self, system_context: &str, prompt: &str) -> Result<String, GeneratorError> {
        match tokio::time::timeout(self.limit, self.inner.generate(system_context, prompt)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(limit_secs = self.limit.as_secs(), "Generator call timed out");
                Err(GeneratorError::Timeout { after: self.limit })
            }
        }
    }
}
