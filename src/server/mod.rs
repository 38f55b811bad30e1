//! HTTP API 서버
//!
//! - `POST /api/ask`  `{question}` → `{answer, sources[], model}`
//! - `GET  /api/stats` → `{num_documents, total_characters, ..., sources[]}`

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::engine::{CorpusStats, PkmEngine, SourceRef};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct AskReply {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentInfo {
    pub title: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct StatsReply {
    #[serde(flatten)]
    pub stats: CorpusStats,
    pub sources: Vec<DocumentInfo>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

// ============================================================================
// Routes
// ============================================================================

pub fn router(engine: Arc<PkmEngine>) -> Router {
    Router::new()
        .route("/api/ask", post(ask_handler))
        .route("/api/stats", get(stats_handler))
        .with_state(engine)
}

/// 서버 실행 (종료 시까지 블록)
pub async fn serve(engine: Arc<PkmEngine>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, router(engine))
        .await
        .context("HTTP server error")
}

// ============================================================================
// Handlers
// ============================================================================

async fn ask_handler(
    State(engine): State<Arc<PkmEngine>>,
    Json(request): Json<AskRequest>,
) -> Response {
    let question = request.question.trim();
    if question.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No question provided");
    }

    tracing::info!("Received question: {}", question);
    let response = engine.ask(question).await;

    if let Some(error) = response.error {
        tracing::warn!("Ask failed: {}", error);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, error);
    }

    Json(AskReply {
        answer: response
            .answer
            .unwrap_or_else(|| "No answer generated".to_string()),
        sources: response.sources,
        model: response.model.unwrap_or_else(|| "unknown".to_string()),
    })
    .into_response()
}

async fn stats_handler(State(engine): State<Arc<PkmEngine>>) -> Json<StatsReply> {
    Json(StatsReply {
        stats: engine.stats(),
        sources: engine
            .documents()
            .iter()
            .map(|d| DocumentInfo {
                title: d.title.clone(),
                path: d.path.clone(),
            })
            .collect(),
    })
}
