//! Thread Chat - a document-aware, tool-using chat assistant
//!
//! Serves a single-page chat UI and a JSON/SSE API. Each conversation can
//! index one uploaded PDF and the model can call a small set of tools while
//! answering.

mod api;
mod config;
mod llm;
mod rag;
mod runtime;
mod session;
mod state_machine;
mod store;
mod system_prompt;
mod tools;

use api::{create_router, AppState};
use config::AppConfig;
use llm::{GeminiService, LoggingService};
use rag::GeminiEmbedder;
use std::net::SocketAddr;
use std::sync::Arc;
use tools::ToolRegistry;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thread_chat=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();

    if config.llm.google_api_key.is_none() {
        tracing::warn!("GOOGLE_API_KEY is not set. Chat and document upload will fail.");
    }
    if config.alphavantage_api_key.is_none() {
        tracing::info!("ALPHAVANTAGE_API_KEY is not set, stock quotes are unavailable");
    }

    let gemini = GeminiService::new(
        config.llm.google_api_key.clone(),
        config.llm.chat_model.clone(),
    );
    let llm = Arc::new(LoggingService::new(Arc::new(gemini)));
    let embedder = Arc::new(GeminiEmbedder::new(
        config.llm.google_api_key.clone(),
        config.llm.embedding_model.clone(),
    ));
    let tools = Arc::new(ToolRegistry::standard(config.alphavantage_api_key.clone()));

    tracing::info!(
        model = %config.llm.chat_model,
        embedding_model = %config.llm.embedding_model,
        max_tool_rounds = config.turn.max_tool_rounds,
        turn_timeout_secs = config.turn.timeout.as_secs(),
        "Configuration loaded"
    );

    let state = AppState::new(llm, tools, embedder, config.turn);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Thread Chat listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
