//! Router assembly: HTTP endpoints, generated-worksheet serving, static
//! files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
  routing::{get, post},
  Router,
};
use tower_http::{
  cors::{Any, CorsLayer},
  services::{ServeDir, ServeFile},
  trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - REST-ish API under `/api/v1/...`
/// - Generated worksheets served read-only under `/worksheets`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
  // Static files with SPA fallback
  let static_service = ServeDir::new("./static")
    .append_index_html_on_directories(true)
    .not_found_service(ServeFile::new("./static/index.html"));

  // Generated worksheets are plain HTML files; serve them directly.
  let worksheets_service = ServeDir::new(state.store.path_for_dir("worksheets"));

  Router::new()
    // HTTP API
    .route("/api/v1/health", get(http::http_health))
    .route("/api/v1/syllabus/analyze", post(http::http_analyze_syllabus))
    .route("/api/v1/syllabus/:grade/:subject", get(http::http_load_syllabus))
    .route("/api/v1/worksheet", post(http::http_generate_worksheet))
    .route("/api/v1/worksheets", get(http::http_list_worksheets))
    .route("/api/v1/grade/text", post(http::http_grade_text))
    .route("/api/v1/grade/vision", post(http::http_grade_vision))
    // State + CORS + HTTP tracing
    .with_state(state)
    .nest_service("/worksheets", worksheets_service)
    .layer(
      CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any),
    )
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
    // Frontend fallback
    .fallback_service(static_service)
}
