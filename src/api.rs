//! HTTP API for the chat server

mod assets;
mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::config::TurnConfig;
use crate::llm::LlmService;
use crate::rag::{DocumentRegistry, Embedder};
use crate::runtime::{ToolExecutor, TurnManager};
use crate::session::SessionRegistry;
use crate::store::InMemoryStore;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub turns: Arc<TurnManager>,
    pub sessions: Arc<SessionRegistry>,
    pub store: InMemoryStore,
    pub documents: Arc<DocumentRegistry>,
}

impl AppState {
    pub fn new(
        llm: Arc<dyn LlmService>,
        tools: Arc<dyn ToolExecutor>,
        embedder: Arc<dyn Embedder>,
        turn_config: TurnConfig,
    ) -> Self {
        let store = InMemoryStore::new();
        let documents = Arc::new(DocumentRegistry::new(embedder));
        Self {
            turns: Arc::new(TurnManager::new(
                store.clone(),
                llm,
                tools,
                Arc::clone(&documents),
                turn_config,
            )),
            sessions: Arc::new(SessionRegistry::new(store.clone())),
            store,
            documents,
        }
    }
}
