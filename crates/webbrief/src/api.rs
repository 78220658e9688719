//! HTTP surface: `POST /api/search` and `GET /healthz`.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use webbrief_core::SearchResult;
use webbrief_local::{run_with_deadline, Aggregator};

pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    /// Wall-clock budget for one query.
    pub budget: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Query parameter is required")]
    MissingQuery,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::MissingQuery => StatusCode::BAD_REQUEST,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/search", post(search))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// The non-blank `query` string of a request body, if there is one.
fn query_of(body: &serde_json::Value) -> Option<&str> {
    body.get("query")
        .and_then(|q| q.as_str())
        .filter(|q| !q.trim().is_empty())
}

async fn search(
    State(state): State<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<SearchResult>, ApiError> {
    let Ok(Json(body)) = body else {
        return Err(ApiError::MissingQuery);
    };
    let query = query_of(&body).ok_or(ApiError::MissingQuery)?;
    tracing::info!(query_chars = query.chars().count(), "search request");
    let report = run_with_deadline(state.aggregator.clone(), query, state.budget).await;
    tracing::info!(
        outcome = report.outcome.as_str(),
        fallback = report.outcome.is_fallback(),
        sources = report.result.sources.len(),
        "search answered"
    );
    Ok(Json(report.result))
}
