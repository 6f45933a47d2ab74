//! HTTP request handlers

use super::assets::{get_index_html, serve_static};
use super::sse::turn_stream;
use super::types::{
    CancelResponse, ChatRequest, ConversationListResponse, ConversationStateResponse,
    DocumentResponse, ErrorResponse, UploadQuery,
};
use super::AppState;
use crate::rag::{IngestSummary, RagError};
use crate::runtime::TurnError;
use crate::session::{SessionError, SessionView, SwitchResult};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Largest accepted document upload
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Chat page and its assets
        .route("/", get(serve_index))
        .route("/assets/*path", get(serve_static))
        // Sessions
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:sid", get(get_session))
        .route("/api/sessions/:sid/new", post(new_conversation))
        .route("/api/sessions/:sid/switch/:cid", post(switch_conversation))
        // Conversations
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/:id", get(get_conversation))
        .route("/api/conversations/:id/chat", post(send_chat))
        .route("/api/conversations/:id/cancel", post(cancel_turn))
        .route(
            "/api/conversations/:id/documents",
            post(upload_document)
                .get(get_document)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

async fn serve_index() -> Response {
    match get_index_html() {
        Some(content) => Html(content).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Html("<h1>404 - UI not found</h1>".to_string()),
        )
            .into_response(),
    }
}

// ============================================================
// Sessions
// ============================================================

async fn create_session(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.sessions.create_session().await)
}

async fn get_session(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.sessions.view(&sid).await?))
}

async fn new_conversation(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.sessions.new_conversation(&sid).await?))
}

async fn switch_conversation(
    State(state): State<AppState>,
    Path((sid, cid)): Path<(String, String)>,
) -> Result<Json<SwitchResult>, AppError> {
    Ok(Json(state.sessions.switch_conversation(&sid, &cid).await?))
}

// ============================================================
// Conversations
// ============================================================

async fn list_conversations(State(state): State<AppState>) -> Json<ConversationListResponse> {
    Json(ConversationListResponse {
        conversations: state.store.list_conversations().await,
    })
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ConversationStateResponse> {
    Json(ConversationStateResponse {
        messages: state.store.get_messages(&id).await,
        busy: state.turns.is_busy(&id).await,
        document: state.documents.metadata(&id).await,
        conversation_id: id,
    })
}

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let text = req
        .user_text()
        .ok_or_else(|| AppError::BadRequest("No user message in request".to_string()))?;
    let rx = state.turns.start_turn(&id, text).await?;
    Ok(turn_stream(rx).into_response())
}

async fn cancel_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.turns.cancel(&id).await,
    })
}

// ============================================================
// Documents
// ============================================================

async fn upload_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<IngestSummary>, AppError> {
    let filename = query
        .filename
        .ok_or_else(|| AppError::BadRequest("filename query parameter is required".to_string()))?;
    let summary = state.documents.ingest(&id, &body, &filename).await?;
    Ok(Json(summary))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<DocumentResponse> {
    Json(DocumentResponse {
        document: state.documents.metadata(&id).await,
    })
}

async fn get_version() -> &'static str {
    concat!("thread-chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::UnknownSession(_) => AppError::NotFound(e.to_string()),
        }
    }
}

impl From<TurnError> for AppError {
    fn from(e: TurnError) -> Self {
        match e {
            TurnError::Busy => AppError::Conflict(e.to_string()),
            TurnError::InvalidInput(_) => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<RagError> for AppError {
    fn from(e: RagError) -> Self {
        match e {
            RagError::InvalidInput(_) => AppError::BadRequest(e.to_string()),
            RagError::Ingestion(_) => AppError::Unprocessable(e.to_string()),
            RagError::Embedding(_) => AppError::Internal(e.to_string()),
        }
    }
}
