//! Loading prompt templates and model parameters from TOML.
//!
//! Each LLM-backed operation (`syllabus_analyzer`, `worksheet`, `grading`,
//! `grading_vision`) carries its own template and sampling parameters.
//! Defaults are compiled in; a TOML file at PROMPTS_CONFIG_PATH overrides
//! them. Configuration is loaded once at process start and passed into every
//! pipeline — there is no implicit re-read.

use serde::Deserialize;
use tracing::{error, info};

/// Template + sampling parameters for one operation.
#[derive(Clone, Debug, Deserialize)]
pub struct OperationSpec {
  pub system_prompt: String,
  pub temperature: f32,
  pub max_tokens: u32,
}

/// All prompt configuration, keyed by operation name.
#[derive(Clone, Debug, Deserialize)]
pub struct PromptConfig {
  #[serde(default = "default_syllabus_analyzer")]
  pub syllabus_analyzer: OperationSpec,
  #[serde(default = "default_worksheet")]
  pub worksheet: OperationSpec,
  #[serde(default = "default_grading")]
  pub grading: OperationSpec,
  #[serde(default = "default_grading_vision")]
  pub grading_vision: OperationSpec,
}

impl Default for PromptConfig {
  fn default() -> Self {
    Self {
      syllabus_analyzer: default_syllabus_analyzer(),
      worksheet: default_worksheet(),
      grading: default_grading(),
      grading_vision: default_grading_vision(),
    }
  }
}

fn default_syllabus_analyzer() -> OperationSpec {
  OperationSpec {
    system_prompt: "You are a curriculum analyst. Below is a raw syllabus for Grade {grade} {subject}.\n\
\n\
Syllabus text:\n{syllabus_text}\n\
\n\
Extract the structure as JSON with this exact shape:\n\
{\"grade\": {grade}, \"subject\": \"{subject}\", \"topics\": [{\"name\": \"...\", \"subtopics\": [{\"id\": \"short_snake_case_id\", \"name\": \"...\", \"difficulty\": \"easy|medium|hard\", \"description\": \"one line\"}]}]}\n\
\n\
Rules: ids must be unique across the whole document. Respond with JSON only, no commentary.".into(),
    temperature: 0.3,
    max_tokens: 2000,
  }
}

fn default_worksheet() -> OperationSpec {
  OperationSpec {
    system_prompt: "You generate printable worksheets for Grade {grade} students. \
Worksheet topic: {topic}.\n\
Produce the BODY HTML only (no <html> or <head>), following each section \
instruction below exactly. Sections must appear in order and contain exactly \
what they ask for, nothing more.\n\
{section_instructions}".into(),
    temperature: 0.7,
    max_tokens: 4000,
  }
}

fn default_grading() -> OperationSpec {
  OperationSpec {
    system_prompt: "You are grading a Grade {grade} {subject} worksheet titled '{worksheet_title}'.\n\
Answer key: {answer_key}\n\
Student answers:\n{student_answers}\n\
\n\
Return JSON only: {\"score\": number, \"total_questions\": number, \"percentage\": number, \"feedback\": \"short encouraging feedback\", \"details\": [{\"question\": number, \"correct\": boolean, \"comment\": \"...\"}]}".into(),
    temperature: 0.2,
    max_tokens: 2000,
  }
}

fn default_grading_vision() -> OperationSpec {
  OperationSpec {
    system_prompt: "You are grading a Grade {grade} {subject} worksheet titled '{worksheet_title}' \
from {num_images} photographed page(s) of student work, attached below in page order.\n\
Answer key: {answer_key}\n\
Read every answer you can see, judge correctness, and return JSON only: \
{\"score\": number, \"total_questions\": number, \"percentage\": number, \"feedback\": \"short feedback\", \"illegible\": [question numbers you could not read]}".into(),
    temperature: 0.2,
    max_tokens: 3000,
  }
}

/// Placeholders each operation's template must reference. Checked once at
/// startup so a broken override fails before the first request.
const REQUIRED_FIELDS: [(&str, &[&str]); 4] = [
  ("syllabus_analyzer", &["syllabus_text", "grade", "subject"]),
  ("worksheet", &["grade", "topic", "section_instructions"]),
  (
    "grading",
    &["grade", "subject", "worksheet_title", "student_answers", "answer_key"],
  ),
  (
    "grading_vision",
    &["grade", "subject", "worksheet_title", "num_images", "answer_key"],
  ),
];

impl PromptConfig {
  fn spec(&self, operation: &str) -> Option<&OperationSpec> {
    match operation {
      "syllabus_analyzer" => Some(&self.syllabus_analyzer),
      "worksheet" => Some(&self.worksheet),
      "grading" => Some(&self.grading),
      "grading_vision" => Some(&self.grading_vision),
      _ => None,
    }
  }

  /// Verify every operation's template references its full closed set of
  /// placeholders. Returns the list of problems, empty when valid.
  pub fn validate(&self) -> Vec<String> {
    let mut problems = Vec::new();
    for (operation, fields) in REQUIRED_FIELDS {
      let spec = self.spec(operation).expect("known operation");
      for field in fields {
        let needle = format!("{{{field}}}");
        if !spec.system_prompt.contains(&needle) {
          problems.push(format!("operation '{operation}' is missing placeholder '{needle}'"));
        }
      }
    }
    problems
  }
}

/// Attempt to load `PromptConfig` from PROMPTS_CONFIG_PATH. On any
/// parsing/IO error, returns None and the caller falls back to defaults.
pub fn load_prompt_config_from_env() -> Option<PromptConfig> {
  let path = std::env::var("PROMPTS_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<PromptConfig>(&s) {
      Ok(cfg) => {
        info!(target: "worksheetforge_backend", %path, "Loaded prompt config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "worksheetforge_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "worksheetforge_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
