//! Grading completed worksheets, from raw text answers or photographed
//! pages.
//!
//! Both entry points share the gateway and sanitizer. The text path is a
//! single non-retried call and insists on `score`, `total_questions`, and
//! `percentage` in the parsed object; the vision path tolerates transient
//! provider failures via the gateway's retry loop and accepts any parseable
//! object. Results are returned as JSON with an injected `metadata` block
//! and can be persisted one file per call, keyed by student and timestamp.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::PromptConfig;
use crate::domain::{estimated_cost, PipelineError, ResultMetadata, Usage};
use crate::openrouter::{ContentPart, OpenRouter};
use crate::sanitize::sanitize_json;
use crate::store::{FileStore, StoreKey};
use crate::util::{fill_template, trunc_for_log};

/// Substituted when the teacher provides no answer key.
const NO_ANSWER_KEY: &str = "Not provided. Evaluate correctness based on standard expectations.";

/// One photographed worksheet page: base64 payload plus its MIME type.
#[derive(Clone, Debug, Deserialize)]
pub struct ImagePage {
  pub data: String,
  pub mime_type: String,
}

fn effective_answer_key(answer_key: Option<&str>) -> &str {
  match answer_key {
    Some(k) if !k.trim().is_empty() => k,
    _ => NO_ANSWER_KEY,
  }
}

fn inject_metadata(result: &mut Value, model: &str, usage: &Usage, grade: u32, subject: &str) {
  if let Some(obj) = result.as_object_mut() {
    let metadata = ResultMetadata {
      model: model.to_string(),
      tokens_used: usage.total_tokens,
      prompt_tokens: usage.prompt_tokens,
      completion_tokens: usage.completion_tokens,
      grade_level: grade,
      subject: subject.to_string(),
    };
    obj.insert("metadata".into(), serde_json::to_value(metadata).expect("metadata serializes"));
  }
}

fn parse_grading_json(raw: &str) -> Result<Value, PipelineError> {
  let candidate = sanitize_json(raw).ok_or_else(|| {
    PipelineError::Parse(format!("no JSON object in model output: {}", trunc_for_log(raw, 500)))
  })?;
  serde_json::from_str(&candidate)
    .map_err(|e| PipelineError::Parse(format!("grading response is not valid JSON: {e}")))
}

/// Grade typed-in student answers. Single gateway call, no retry.
#[instrument(level = "info", skip_all, fields(grade = grade, subject = %subject, worksheet_title = %worksheet_title, answers_len = student_answers.len()))]
pub async fn grade_text(
  gateway: &OpenRouter,
  prompts: &PromptConfig,
  grade: u32,
  subject: &str,
  worksheet_title: &str,
  student_answers: &str,
  answer_key: Option<&str>,
) -> Result<Value, PipelineError> {
  let op = &prompts.grading;
  let prompt = fill_template(
    &op.system_prompt,
    &[
      ("grade", &grade.to_string()),
      ("subject", subject),
      ("worksheet_title", worksheet_title),
      ("student_answers", student_answers),
      ("answer_key", effective_answer_key(answer_key)),
    ],
  );

  info!(target: "grading", grade, subject, worksheet_title, "Grading worksheet (text answers)");
  let response = gateway
    .invoke_text("grading", &prompt, &gateway.text_model, op.temperature, op.max_tokens)
    .await?;

  let mut result = parse_grading_json(&response.content)?;

  for key in ["score", "total_questions", "percentage"] {
    if result.get(key).is_none() {
      return Err(PipelineError::Parse(format!("grading response is missing '{key}'")));
    }
  }

  inject_metadata(&mut result, &gateway.text_model, &response.usage, grade, subject);
  info!(
    target: "grading",
    score = %result["score"],
    total_questions = %result["total_questions"],
    percentage = %result["percentage"],
    total_tokens = response.usage.total_tokens,
    cost_usd = format!("{:.6}", estimated_cost(&gateway.text_model, &response.usage)),
    "Grading completed"
  );
  Ok(result)
}

/// Grade a multipage worksheet from photographed pages. The payload is one
/// text instruction naming the page count, followed by one inline image per
/// page; the gateway retries transient failures (3 attempts, 2 s pause).
#[instrument(level = "info", skip_all, fields(grade = grade, subject = %subject, worksheet_title = %worksheet_title, pages = images.len()))]
pub async fn grade_vision(
  gateway: &OpenRouter,
  prompts: &PromptConfig,
  grade: u32,
  subject: &str,
  worksheet_title: &str,
  images: &[ImagePage],
  answer_key: Option<&str>,
) -> Result<Value, PipelineError> {
  let op = &prompts.grading_vision;
  let prompt = fill_template(
    &op.system_prompt,
    &[
      ("grade", &grade.to_string()),
      ("subject", subject),
      ("worksheet_title", worksheet_title),
      ("num_images", &images.len().to_string()),
      ("answer_key", effective_answer_key(answer_key)),
    ],
  );

  let mut parts = Vec::with_capacity(images.len() + 1);
  parts.push(ContentPart::text(prompt));
  for page in images {
    parts.push(ContentPart::inline_image(&page.mime_type, &page.data));
  }

  info!(target: "grading", grade, subject, worksheet_title, pages = images.len(), "Grading worksheet (vision)");
  let response = gateway
    .invoke_vision("grading_vision", parts, &gateway.vision_model, op.temperature, op.max_tokens)
    .await?;

  let mut result = parse_grading_json(&response.content)?;
  inject_metadata(&mut result, &gateway.vision_model, &response.usage, grade, subject);

  if result.get("score").is_none() {
    // Vision output is best-effort; surface the gap in logs only.
    warn!(target: "grading", "Vision grading result has no 'score' field");
  }
  info!(
    target: "grading",
    total_tokens = response.usage.total_tokens,
    cost_usd = format!("{:.6}", estimated_cost(&gateway.vision_model, &response.usage)),
    "Grading completed"
  );
  Ok(result)
}

/// Persist one grading result, keyed by sanitized student name and call
/// timestamp. Timestamps make collisions a non-issue in practice; they are
/// not guarded against.
#[instrument(level = "info", skip(store, result))]
pub fn save_result(
  store: &FileStore,
  result: &Value,
  student_name: &str,
) -> std::io::Result<std::path::PathBuf> {
  let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
  let key = StoreKey::GradingResult { student: student_name.to_string(), timestamp };
  let json = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
  let path = store.put(&key, &json)?;
  info!(target: "grading", path = %path.display(), "Grading result saved");
  Ok(path)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_answer_key_gets_the_standard_instruction() {
    assert_eq!(effective_answer_key(None), NO_ANSWER_KEY);
    assert_eq!(effective_answer_key(Some("   ")), NO_ANSWER_KEY);
    assert_eq!(effective_answer_key(Some("1. B")), "1. B");
  }

  #[test]
  fn metadata_is_injected_into_parsed_results() {
    let mut result = serde_json::json!({"score": 7, "total_questions": 10, "percentage": 70.0});
    let usage = Usage { prompt_tokens: 100, completion_tokens: 50, total_tokens: 150 };
    inject_metadata(&mut result, "some/model", &usage, 3, "Math");

    assert_eq!(result["metadata"]["model"], "some/model");
    assert_eq!(result["metadata"]["tokens_used"], 150);
    assert_eq!(result["metadata"]["grade_level"], 3);
    assert_eq!(result["metadata"]["subject"], "Math");
  }

  #[test]
  fn grading_json_is_extracted_from_fenced_prose() {
    let raw = "Sure! Here it is:\n```json\n{\"score\": 5}\n```";
    assert_eq!(parse_grading_json(raw).unwrap()["score"], 5);

    let err = parse_grading_json("no braces at all").unwrap_err();
    assert!(matches!(err, PipelineError::Parse(_)));
  }

  #[tokio::test]
  async fn text_grading_requires_summary_keys() {
    use crate::config::PromptConfig;
    use crate::testutil::{ok_chat_body, StubServer};

    let stub = StubServer::spawn(vec![(200, ok_chat_body(r#"{"score": 5, "feedback": "nice"}"#))]);
    let gw = stub.gateway();

    let err = grade_text(&gw, &PromptConfig::default(), 3, "Math", "Review", "1. 42", None)
      .await
      .unwrap_err();
    assert!(matches!(err, PipelineError::Parse(_)), "{err}");
    assert_eq!(stub.hits(), 1);
  }

  #[tokio::test]
  async fn text_grading_attaches_metadata_on_success() {
    use crate::config::PromptConfig;
    use crate::testutil::{ok_chat_body, StubServer};

    let body = r#"{"score": 8, "total_questions": 10, "percentage": 80.0, "feedback": "good"}"#;
    let stub = StubServer::spawn(vec![(200, ok_chat_body(body))]);
    let gw = stub.gateway();

    let result = grade_text(&gw, &PromptConfig::default(), 3, "Math", "Review", "answers", Some("1. B"))
      .await
      .unwrap();
    assert_eq!(result["score"], 8);
    assert_eq!(result["metadata"]["model"], "stub/text-model");
    assert_eq!(result["metadata"]["tokens_used"], 200);
    assert_eq!(result["metadata"]["grade_level"], 3);
  }

  #[tokio::test]
  async fn vision_grading_does_not_require_summary_keys() {
    use crate::config::PromptConfig;
    use crate::testutil::{ok_chat_body, StubServer};

    let stub = StubServer::spawn(vec![(200, ok_chat_body(r#"{"feedback": "legible, mostly right"}"#))]);
    let gw = stub.gateway();
    let pages = vec![ImagePage { data: "aGVsbG8=".into(), mime_type: "image/jpeg".into() }];

    let result = grade_vision(&gw, &PromptConfig::default(), 3, "Math", "Review", &pages, None)
      .await
      .unwrap();
    assert_eq!(result["feedback"], "legible, mostly right");
    assert_eq!(result["metadata"]["model"], "stub/vision-model");
  }

  #[test]
  fn saved_results_land_under_student_and_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    let result = serde_json::json!({"score": 5, "metadata": {"model": "m"}});

    let path = save_result(&store, &result, "Ana P.").unwrap();
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("grade_Ana_P__"), "{name}");
    assert!(name.ends_with(".json"));

    let reread: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(reread["score"], 5);
  }
}
