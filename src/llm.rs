//! LLM provider abstraction
//!
//! The chat model is reached only through [`LlmService`]; the Gemini
//! implementation is the one wired up in production.

mod error;
mod gemini;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use gemini::{GeminiService, GEMINI_API_BASE};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Make a completion request, pushing text deltas into `sink` as they
    /// arrive. The returned response holds the aggregated content.
    ///
    /// Providers without incremental output deliver the whole text as one
    /// delta.
    async fn stream(
        &self,
        request: &LlmRequest,
        sink: mpsc::Sender<String>,
    ) -> Result<LlmResponse, LlmError> {
        let response = self.complete(request).await?;
        let text = response.text();
        if !text.is_empty() {
            let _ = sink.send(text).await;
        }
        Ok(response)
    }

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }

    fn log_result(&self, result: &Result<LlmResponse, LlmError>, started: std::time::Instant) {
        let duration = started.elapsed();
        match result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    tool_calls = response.tool_uses().len(),
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
            }
        }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        self.log_result(&result, start);
        result
    }

    async fn stream(
        &self,
        request: &LlmRequest,
        sink: mpsc::Sender<String>,
    ) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.stream(request, sink).await;
        self.log_result(&result, start);
        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
