//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::ToolExecutor;
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService, ToolDefinition};
use crate::rag::Embedder;
use crate::tools::{ToolContext, ToolOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Mock Embedders
// ============================================================================

/// Deterministic bag-of-words embedder: each lowercase word is hashed into
/// one of `dims` buckets. Texts sharing words score as similar.
pub struct HashEmbedder {
    dims: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dims: 256 }
    }
}

impl HashEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            // FNV-1a
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in word.to_lowercase().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            let bucket = usize::try_from(hash % self.dims as u64).unwrap_or(0);
            vector[bucket] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(self.embed(text))
    }
}

/// Embedder whose service is always down
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Err(LlmError::network("embedding service unreachable"))
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        Err(LlmError::network("embedding service unreachable"))
    }
}

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_response(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.next_response(request)
    }

    /// Streams the response text one word at a time
    async fn stream(
        &self,
        request: &LlmRequest,
        sink: mpsc::Sender<String>,
    ) -> Result<LlmResponse, LlmError> {
        let response = self.next_response(request)?;
        for piece in response.text().split_inclusive(' ') {
            let _ = sink.send(piece.to_string()).await;
        }
        Ok(response)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Mock LLM client that waits before answering
pub struct DelayedMockLlmClient {
    inner: MockLlmClient,
    delay: Duration,
}

impl DelayedMockLlmClient {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MockLlmClient::new("delayed-mock"),
            delay,
        }
    }

    pub fn queue_response(&self, response: LlmResponse) {
        self.inner.queue_response(response);
    }
}

#[async_trait]
impl LlmService for DelayedMockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        tokio::time::sleep(self.delay).await;
        self.inner.complete(request).await
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

// ============================================================================
// Mock Tool Executor
// ============================================================================

/// Mock tool executor with predefined outputs
pub struct MockToolExecutor {
    outputs: HashMap<String, ToolOutput>,
    definitions: Vec<ToolDefinition>,
    /// How long each call takes
    delay: Option<Duration>,
    /// Record of tool executions
    pub executions: Mutex<Vec<(String, Value)>>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
            definitions: Vec::new(),
            delay: None,
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Add a tool with a predefined output
    pub fn with_tool(mut self, name: impl Into<String>, output: ToolOutput) -> Self {
        let name = name.into();
        self.definitions.push(ToolDefinition {
            name: name.clone(),
            description: format!("Mock {name}"),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        });
        self.outputs.insert(name, output);
        self
    }

    /// Make every call take `delay` before returning
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get recorded executions
    pub fn recorded_executions(&self) -> Vec<(String, Value)> {
        self.executions.lock().unwrap().clone()
    }
}

impl Default for MockToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, name: &str, input: Value, _ctx: ToolContext) -> Option<ToolOutput> {
        let output = self.outputs.get(name).cloned()?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.executions
            .lock()
            .unwrap()
            .push((name.to_string(), input));
        Some(output)
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::cosine_similarity;

    #[test]
    fn test_hash_embedder_is_deterministic_and_word_based() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("Octopuses have three hearts");
        assert_eq!(a, embedder.embed("octopuses HAVE three hearts!"));

        let related = embedder.embed("how many hearts do octopuses have");
        let unrelated = embedder.embed("crows recognise faces");
        assert!(cosine_similarity(&a, &related) > cosine_similarity(&a, &unrelated));
    }

    #[tokio::test]
    async fn test_mock_stream_pieces_join_to_text() {
        let llm = MockLlmClient::new("m");
        llm.queue_response(LlmResponse::text_only("one two three"));
        let (tx, mut rx) = mpsc::channel(16);
        let request = LlmRequest {
            system: None,
            messages: vec![],
            tools: vec![],
            max_tokens: None,
        };
        let response = llm.stream(&request, tx).await.unwrap();

        let mut joined = String::new();
        while let Some(piece) = rx.recv().await {
            joined.push_str(&piece);
        }
        assert_eq!(joined, response.text());
    }
}
