//! HTTP endpoint handlers. These are thin wrappers that forward to the
//! pipelines; failures become JSON error envelopes and the detail stays in
//! operator logs.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use base64::Engine as _;
use tracing::{error, info, instrument, warn};

use crate::domain::PipelineError;
use crate::protocol::*;
use crate::state::AppState;
use crate::{grading, syllabus, worksheet};

/// Status code for a failed pipeline call. Clients get the kind, not the
/// upstream detail.
fn failure_status(e: &PipelineError) -> StatusCode {
  match e {
    PipelineError::MissingSyllabus { .. } => StatusCode::BAD_REQUEST,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

fn gateway_unavailable() -> (StatusCode, Json<ErrorOut>) {
  (
    StatusCode::SERVICE_UNAVAILABLE,
    Json(ErrorOut::new("LLM gateway disabled (no OPENROUTER_API_KEY)")),
  )
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state, body), fields(grade = body.grade, subject = %body.subject, text_len = body.syllabus_text.len()))]
pub async fn http_analyze_syllabus(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AnalyzeSyllabusIn>,
) -> impl IntoResponse {
  if body.syllabus_text.trim().is_empty() || body.grade == 0 {
    return (
      StatusCode::BAD_REQUEST,
      Json(ErrorOut::new("Missing syllabus text or grade")),
    )
      .into_response();
  }
  let Some(gateway) = &state.gateway else {
    return gateway_unavailable().into_response();
  };

  match syllabus::analyze(
    gateway,
    &state.prompts,
    &state.store,
    &body.syllabus_text,
    body.grade,
    &body.subject,
    true,
  )
  .await
  {
    Ok(doc) => {
      info!(target: "syllabus", grade = body.grade, subject = %body.subject, "HTTP syllabus analyzed");
      let data = serde_json::to_value(&doc).unwrap_or_default();
      Json(AnalyzeSyllabusOut { success: true, data }).into_response()
    }
    Err(e) => {
      error!(target: "syllabus", error = %e, "Syllabus analysis failed");
      (failure_status(&e), Json(ErrorOut::new("Failed to analyze syllabus"))).into_response()
    }
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_load_syllabus(
  State(state): State<Arc<AppState>>,
  Path((grade, subject)): Path<(u32, String)>,
) -> impl IntoResponse {
  match syllabus::load(&state.store, grade, &subject) {
    Some(doc) => {
      let data = serde_json::to_value(&doc).unwrap_or_default();
      Json(AnalyzeSyllabusOut { success: true, data }).into_response()
    }
    None => (StatusCode::NOT_FOUND, Json(ErrorOut::new("No syllabus found"))).into_response(),
  }
}

#[instrument(level = "info", skip(state, body), fields(grade = body.grade, title = %body.title, blocks = body.question_blocks.len()))]
pub async fn http_generate_worksheet(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateWorksheetIn>,
) -> impl IntoResponse {
  if body.title.trim().is_empty() || body.question_blocks.is_empty() || body.grade == 0 {
    return (StatusCode::BAD_REQUEST, Json(ErrorOut::new("Missing required fields"))).into_response();
  }
  let Some(gateway) = &state.gateway else {
    return gateway_unavailable().into_response();
  };

  match worksheet::generate(
    gateway,
    &state.prompts,
    &state.store,
    body.grade,
    &body.title,
    &body.question_blocks,
    &body.subject,
  )
  .await
  {
    Ok(generated) => {
      info!(target: "worksheet", filename = %generated.filename, "HTTP worksheet generated");
      Json(GenerateWorksheetOut {
        success: true,
        message: "Worksheet generated successfully".into(),
        filename: generated.filename,
        expected_questions: generated.expected_questions,
      })
      .into_response()
    }
    Err(e) => {
      error!(target: "worksheet", error = %e, "Worksheet generation failed");
      let message = match &e {
        PipelineError::MissingSyllabus { grade, subject } => {
          format!("No analyzed syllabus for grade {grade} {subject}; analyze one first")
        }
        _ => "Failed to generate worksheet".to_string(),
      };
      (failure_status(&e), Json(ErrorOut::new(message))).into_response()
    }
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_worksheets(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let worksheets = state
    .store
    .list_worksheets()
    .into_iter()
    .map(|filename| WorksheetEntry { filename })
    .collect();
  Json(WorksheetListOut { worksheets })
}

#[instrument(level = "info", skip(state, body), fields(grade = body.grade, subject = %body.subject, title = %body.worksheet_title))]
pub async fn http_grade_text(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GradeTextIn>,
) -> impl IntoResponse {
  if body.student_answers.trim().is_empty() {
    return (StatusCode::BAD_REQUEST, Json(ErrorOut::new("Missing student answers"))).into_response();
  }
  let Some(gateway) = &state.gateway else {
    return gateway_unavailable().into_response();
  };

  match grading::grade_text(
    gateway,
    &state.prompts,
    body.grade,
    &body.subject,
    &body.worksheet_title,
    &body.student_answers,
    body.answer_key.as_deref(),
  )
  .await
  {
    Ok(result) => {
      if let Some(student) = body.student_name.as_deref().filter(|s| !s.trim().is_empty()) {
        if let Err(e) = grading::save_result(&state.store, &result, student) {
          warn!(target: "grading", error = %e, "Could not save grading result");
        }
      }
      Json(GradeOut { success: true, data: result }).into_response()
    }
    Err(e) => {
      error!(target: "grading", error = %e, "Text grading failed");
      (failure_status(&e), Json(ErrorOut::new("Failed to grade worksheet"))).into_response()
    }
  }
}

#[instrument(level = "info", skip(state, body), fields(grade = body.grade, subject = %body.subject, pages = body.images.len()))]
pub async fn http_grade_vision(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GradeVisionIn>,
) -> impl IntoResponse {
  if body.images.is_empty() {
    return (StatusCode::BAD_REQUEST, Json(ErrorOut::new("No images provided"))).into_response();
  }
  // Reject undecodable uploads here; the provider would otherwise burn a
  // full retry cycle on them.
  for (i, page) in body.images.iter().enumerate() {
    if base64::engine::general_purpose::STANDARD.decode(&page.data).is_err() {
      return (
        StatusCode::BAD_REQUEST,
        Json(ErrorOut::new(format!("Image {} is not valid base64", i + 1))),
      )
        .into_response();
    }
  }
  let Some(gateway) = &state.gateway else {
    return gateway_unavailable().into_response();
  };

  match grading::grade_vision(
    gateway,
    &state.prompts,
    body.grade,
    &body.subject,
    &body.worksheet_title,
    &body.images,
    body.answer_key.as_deref(),
  )
  .await
  {
    Ok(result) => {
      if let Some(student) = body.student_name.as_deref().filter(|s| !s.trim().is_empty()) {
        if let Err(e) = grading::save_result(&state.store, &result, student) {
          warn!(target: "grading", error = %e, "Could not save grading result");
        }
      }
      Json(GradeOut { success: true, data: result }).into_response()
    }
    Err(e) => {
      error!(target: "grading", error = %e, "Vision grading failed");
      (failure_status(&e), Json(ErrorOut::new("Failed to grade worksheet"))).into_response()
    }
  }
}
