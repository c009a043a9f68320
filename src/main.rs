//! Worksheet Forge · Teacher Worksheet Backend
//!
//! - Axum HTTP API: syllabus analysis, worksheet generation, grading
//! - OpenRouter integration (via environment variables)
//! - Flat-file persistence (syllabus JSON, worksheet HTML, grading results)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                   : u16 (default 3000)
//!   OPENROUTER_API_KEY     : enables LLM integration if present
//!   OPENROUTER_BASE_URL    : default "https://openrouter.ai/api/v1"
//!   OPENROUTER_TEXT_MODEL  : default "google/gemma-3-27b-it:free"
//!   OPENROUTER_VISION_MODEL: default "nvidia/nemotron-nano-12b-v2-vl:free"
//!   PROMPTS_CONFIG_PATH    : path to TOML config (prompt templates + params)
//!   DATA_DIR               : root for syllabus/worksheets/grading_results (default ".")
//!   LOG_LEVEL              : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT             : "pretty" (default) or "json"

mod config;
mod domain;
mod grading;
mod openrouter;
mod protocol;
mod routes;
mod sanitize;
mod state;
mod store;
mod syllabus;
mod telemetry;
#[cfg(test)]
mod testutil;
mod util;
mod worksheet;

use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{error, info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (prompt config, gateway client, store).
  let state = Arc::new(AppState::new());

  // A broken prompt override is a deployment mistake; refuse to serve with
  // templates that can't be rendered.
  let problems = state.prompts.validate();
  if !problems.is_empty() {
    for p in &problems {
      error!(target: "worksheetforge_backend", problem = %p, "Invalid prompt configuration");
    }
    return Err("invalid prompt configuration".into());
  }

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "worksheetforge_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
