//! HTTP API server.
//!
//! Exposes question answering and course statistics as JSON endpoints.

use crate::agent::Source;
use crate::cli::preflight::Operation;
use crate::cli::Output;
use crate::config::Settings;
use crate::error::LecternError;
use crate::rag::{CourseAnalytics, RagSystem};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    rag: Arc<RagSystem>,
}

impl AppState {
    pub fn new(rag: Arc<RagSystem>) -> Self {
        Self { rag }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/query", post(query))
        .route("/api/courses", get(courses))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP API server.
pub async fn run_serve(
    host: Option<String>,
    port: Option<u16>,
    docs: Option<String>,
    settings: Settings,
) -> anyhow::Result<()> {
    super::preflight(Operation::Query)?;

    let rag = Arc::new(RagSystem::new(&settings)?);

    let docs_dir = docs
        .map(|d| Settings::expand_path(&d))
        .unwrap_or_else(|| settings.docs_dir());
    match rag.add_course_folder(&docs_dir, false).await {
        Ok((courses, chunks)) if courses > 0 => {
            Output::success(&format!("Loaded {} courses ({} chunks)", courses, chunks));
        }
        Ok(_) => info!("No new courses in {:?}", docs_dir),
        Err(e) => Output::warning(&format!("Failed to load documents: {}", e)),
    }

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Lectern API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Query", "POST /api/query");
    Output::kv("Courses", "GET  /api/courses");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, router(AppState::new(rag))).await?;

    Ok(())
}

// === Request/Response Types ===

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct QueryResponse {
    answer: String,
    sources: Vec<Source>,
    session_id: String,
}

/// Error body returned with a 500.
struct ApiError(String);

impl From<LecternError> for ApiError {
    fn from(e: LecternError) -> Self {
        Self(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "detail": self.0 })),
        )
            .into_response()
    }
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let session_id = req
        .session_id
        .unwrap_or_else(|| state.rag.sessions().create_session());

    let response = state.rag.query(&req.query, Some(&session_id)).await?;

    Ok(Json(QueryResponse {
        answer: response.answer,
        sources: response.sources,
        session_id,
    }))
}

async fn courses(State(state): State<AppState>) -> Result<Json<CourseAnalytics>, ApiError> {
    Ok(Json(state.rag.course_analytics().await?))
}
