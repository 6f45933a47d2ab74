//! Per-conversation document retrieval
//!
//! Each conversation may own one indexed document. Uploads are parsed into
//! pages, split into overlapping chunks, embedded, and published as a single
//! immutable index that replaces any earlier one for that conversation.

mod embedding;
mod index;
mod loader;
mod splitter;

pub use embedding::{cosine_similarity, Embedder, GeminiEmbedder};

use index::{IndexedChunk, VectorIndex};
use loader::load_documents;
use splitter::RecursiveSplitter;

use crate::llm::LlmError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Results returned per query
pub const MMR_K: usize = 6;
/// Candidates considered before diversity re-ranking
pub const MMR_FETCH_K: usize = 20;
pub const MMR_LAMBDA: f32 = 0.5;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Ingestion failed: {0}")]
    Ingestion(String),
    #[error("Embedding service unavailable: {0}")]
    Embedding(#[from] LlmError),
}

/// Outcome of a successful ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub filename: String,
    pub document_count: usize,
    pub chunk_count: usize,
}

/// What the sidebar shows about a conversation's document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub filename: String,
    pub document_count: usize,
    pub chunk_count: usize,
}

/// A chunk returned by a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub page: usize,
    pub source: String,
}

/// A conversation's searchable document
pub struct DocumentIndex {
    pub conversation_id: String,
    pub filename: String,
    pub document_count: usize,
    index: VectorIndex,
}

impl DocumentIndex {
    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            filename: self.filename.clone(),
            document_count: self.document_count,
            chunk_count: self.index.len(),
        }
    }
}

/// Owns every conversation's document index
pub struct DocumentRegistry {
    embedder: Arc<dyn Embedder>,
    splitter: RecursiveSplitter,
    indexes: RwLock<HashMap<String, Arc<DocumentIndex>>>,
}

impl DocumentRegistry {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            splitter: RecursiveSplitter::default(),
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Parse, split, embed and publish `bytes` as `conv_id`'s document.
    ///
    /// The previous index (if any) stays visible until the new one is
    /// complete; a failed ingestion leaves it in place.
    pub async fn ingest(
        &self,
        conv_id: &str,
        bytes: &[u8],
        filename: &str,
    ) -> Result<IngestSummary, RagError> {
        if bytes.is_empty() {
            return Err(RagError::InvalidInput("uploaded file is empty".to_string()));
        }
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(RagError::InvalidInput("filename is required".to_string()));
        }

        let pages = load_documents(bytes, filename).await?;
        let chunks = self.splitter.split_documents(&pages);
        if chunks.is_empty() {
            return Err(RagError::Ingestion(format!(
                "no extractable text in '{filename}'"
            )));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_documents(&texts)
            .await
            .map_err(|e| RagError::Ingestion(format!("embedding failed: {e}")))?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::Ingestion(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let indexed = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk {
                text: chunk.text,
                page: chunk.page,
                embedding,
            })
            .collect();

        let document = Arc::new(DocumentIndex {
            conversation_id: conv_id.to_string(),
            filename: filename.to_string(),
            document_count: pages.len(),
            index: VectorIndex::new(indexed),
        });
        let summary = IngestSummary {
            filename: document.filename.clone(),
            document_count: document.document_count,
            chunk_count: document.index.len(),
        };

        self.indexes
            .write()
            .await
            .insert(conv_id.to_string(), document);

        tracing::info!(
            conv_id = %conv_id,
            filename = %summary.filename,
            pages = summary.document_count,
            chunks = summary.chunk_count,
            "Document indexed"
        );
        Ok(summary)
    }

    async fn get(&self, conv_id: &str) -> Option<Arc<DocumentIndex>> {
        self.indexes.read().await.get(conv_id).cloned()
    }

    /// `None` when the conversation has no document
    pub async fn query(
        &self,
        conv_id: &str,
        text: &str,
    ) -> Result<Option<Vec<RetrievedChunk>>, RagError> {
        let Some(document) = self.get(conv_id).await else {
            return Ok(None);
        };
        debug_assert_eq!(document.conversation_id, conv_id);

        let query_embedding = self.embedder.embed_query(text).await?;
        let results = document
            .index
            .max_marginal_relevance(&query_embedding, MMR_K, MMR_FETCH_K, MMR_LAMBDA)
            .into_iter()
            .map(|chunk| RetrievedChunk {
                text: chunk.text.clone(),
                page: chunk.page,
                source: document.filename.clone(),
            })
            .collect();
        Ok(Some(results))
    }

    pub async fn metadata(&self, conv_id: &str) -> Option<DocumentMetadata> {
        self.get(conv_id).await.map(|d| d.metadata())
    }
}
