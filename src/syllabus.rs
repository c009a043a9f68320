//! Syllabus structuring: raw syllabus text -> topics/subtopics document.
//!
//! One gateway call per analysis, no retry. Persisted documents are
//! overwritten wholesale when the same (grade, subject) is re-analyzed;
//! there are no merge semantics.

use serde::Deserialize;
use tracing::{info, instrument};

use crate::config::PromptConfig;
use crate::domain::{estimated_cost, PipelineError, SyllabusDocument, SyllabusMetadata, Topic};
use crate::openrouter::OpenRouter;
use crate::sanitize::sanitize_json;
use crate::store::{FileStore, StoreKey};
use crate::util::{fill_template, trunc_for_log};

/// Only `topics` is required of the model; grade and subject are taken from
/// the caller's inputs, with the subject preserved verbatim.
#[derive(Deserialize)]
struct ParsedSyllabus {
  topics: Vec<Topic>,
}

/// Analyze a raw syllabus into a structured document and optionally persist
/// it under the (grade, lowercased subject) key.
#[instrument(level = "info", skip(gateway, prompts, store, syllabus_text), fields(text_len = syllabus_text.len()))]
pub async fn analyze(
  gateway: &OpenRouter,
  prompts: &PromptConfig,
  store: &FileStore,
  syllabus_text: &str,
  grade: u32,
  subject: &str,
  persist: bool,
) -> Result<SyllabusDocument, PipelineError> {
  let op = &prompts.syllabus_analyzer;
  let prompt = fill_template(
    &op.system_prompt,
    &[
      ("syllabus_text", syllabus_text),
      ("grade", &grade.to_string()),
      ("subject", subject),
    ],
  );

  info!(target: "syllabus", grade, subject, "Analyzing syllabus");
  let response = gateway
    .invoke_text("syllabus_analyzer", &prompt, &gateway.text_model, op.temperature, op.max_tokens)
    .await?;

  let candidate = sanitize_json(&response.content).ok_or_else(|| {
    PipelineError::Parse(format!(
      "no JSON object in model output: {}",
      trunc_for_log(&response.content, 500)
    ))
  })?;

  let parsed: ParsedSyllabus = serde_json::from_str(&candidate)
    .map_err(|e| PipelineError::Parse(format!("syllabus JSON did not match expected shape: {e}")))?;

  let document = SyllabusDocument {
    grade,
    subject: subject.to_string(),
    topics: parsed.topics,
    metadata: Some(SyllabusMetadata {
      analyzed_at: chrono::Local::now().to_rfc3339(),
      tokens_used: response.usage.total_tokens,
    }),
  };

  if persist {
    let key = StoreKey::Syllabus { grade, subject: subject.to_string() };
    let json = serde_json::to_string_pretty(&document)
      .map_err(|e| PipelineError::Parse(format!("serialize syllabus document: {e}")))?;
    let path = store
      .put(&key, &json)
      .map_err(|e| PipelineError::Parse(format!("write syllabus document: {e}")))?;
    info!(target: "syllabus", path = %path.display(), "Syllabus document saved");
  }

  info!(
    target: "syllabus",
    grade,
    subject,
    topics = document.topics.len(),
    subtopics = document.subtopic_count(),
    tokens_used = response.usage.total_tokens,
    cost_usd = format!("{:.6}", estimated_cost(&gateway.text_model, &response.usage)),
    "Syllabus analyzed"
  );

  Ok(document)
}

/// Load a previously analyzed syllabus. None when the pair was never
/// analyzed or the file no longer parses.
#[instrument(level = "debug", skip(store))]
pub fn load(store: &FileStore, grade: u32, subject: &str) -> Option<SyllabusDocument> {
  let key = StoreKey::Syllabus { grade, subject: subject.to_string() };
  let raw = store.get(&key)?;
  serde_json::from_str(&raw).ok()
}
