//! Domain models: syllabus documents, question blocks, grading results,
//! token usage, and the pipeline error type.

use serde::{Deserialize, Serialize};

/// Structured syllabus for one (grade, subject) pair, as produced by the
/// analysis pipeline and persisted to disk. Overwritten wholesale when the
/// same pair is re-analyzed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyllabusDocument {
  pub grade: u32,
  pub subject: String,
  pub topics: Vec<Topic>,
  /// Stored under `_metadata` to match the established file format.
  #[serde(rename = "_metadata", default)]
  pub metadata: Option<SyllabusMetadata>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Topic {
  pub name: String,
  pub subtopics: Vec<Subtopic>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Subtopic {
  /// Unique within the document; worksheet blocks reference it.
  pub id: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub difficulty: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyllabusMetadata {
  pub analyzed_at: String,
  pub tokens_used: u32,
}

impl SyllabusDocument {
  /// Linear scan over topics then subtopics; first match wins.
  pub fn find_subtopic(&self, subtopic_id: &str) -> Option<&Subtopic> {
    self
      .topics
      .iter()
      .flat_map(|t| t.subtopics.iter())
      .find(|s| s.id == subtopic_id)
  }

  pub fn subtopic_count(&self) -> usize {
    self.topics.iter().map(|t| t.subtopics.len()).sum()
  }
}

/// One teacher-specified worksheet section. Transient: constructed per
/// request, never persisted.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct QuestionBlock {
  #[serde(default)]
  pub subtopic_id: Option<String>,
  #[serde(default)]
  pub topic_name: Option<String>,
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(default)]
  pub count: Option<u32>,
  /// Answer-option count for multiple choice.
  #[serde(default)]
  pub options: Option<u32>,
  #[serde(default)]
  pub difficulty: Option<String>,
  /// When true, `sub_blocks` share one generated context (one scenario,
  /// chart, or passage). When false they render as independent sections.
  #[serde(default)]
  pub continuous: bool,
  #[serde(default)]
  pub sub_blocks: Vec<QuestionBlock>,
}

/// Chart/table kinds render visual elements instead of questions and are
/// excluded from the expected question total.
pub const CHART_KINDS: [&str; 4] = ["bar_chart", "pie_chart", "line_chart", "data_table"];

impl QuestionBlock {
  pub fn is_chart(&self) -> bool {
    CHART_KINDS.contains(&self.kind.as_str())
  }
}

/// Per-invocation allocator for chart element ids. Two charts of the same
/// kind in one worksheet must never share an id.
#[derive(Debug, Default)]
pub struct ChartCounters {
  pub bar: u32,
  pub pie: u32,
  pub line: u32,
}

impl ChartCounters {
  pub fn next_pie_id(&mut self) -> String {
    let id = format!("piechart_{}", self.pie);
    self.pie += 1;
    id
  }

  pub fn next_line_id(&mut self) -> String {
    let id = format!("linechart_{}", self.line);
    self.line += 1;
    id
  }
}

/// Token counters reported by the provider on every successful call.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
  #[serde(default)]
  pub prompt_tokens: u32,
  #[serde(default)]
  pub completion_tokens: u32,
  #[serde(default)]
  pub total_tokens: u32,
}

/// Per-million-token USD rates for a model: (input, output).
/// Cost is derived for operator logs only, never stored in results.
pub fn model_rates(model: &str) -> (f64, f64) {
  match model {
    m if m.contains("nemotron") => (0.0, 0.0),
    _ => (0.040, 0.150),
  }
}

pub fn estimated_cost(model: &str, usage: &Usage) -> f64 {
  let (input_rate, output_rate) = model_rates(model);
  (usage.prompt_tokens as f64 / 1_000_000.0) * input_rate
    + (usage.completion_tokens as f64 / 1_000_000.0) * output_rate
}

/// Metadata attached to every grading result before it is returned.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultMetadata {
  pub model: String,
  pub tokens_used: u32,
  pub prompt_tokens: u32,
  pub completion_tokens: u32,
  pub grade_level: u32,
  pub subject: String,
}

/// How a pipeline call failed. Callers translate these into user-visible
/// failure responses; the detail stays in operator logs.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineError {
  /// Network-level failure (connection refused, timeout). Retried only on
  /// the vision grading path.
  Transport(String),
  /// Non-2xx status or an in-body `error` envelope. Codes 429/502/503 are
  /// retried on the vision grading path; everything else is terminal.
  Upstream { code: Option<u16>, message: String },
  /// Sanitized content was not valid JSON or lacked required keys. Never
  /// retried.
  Parse(String),
  /// A subtopic lookup was requested but no syllabus document exists for
  /// the (grade, subject) pair.
  MissingSyllabus { grade: u32, subject: String },
}

impl std::fmt::Display for PipelineError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PipelineError::Transport(msg) => write!(f, "transport error: {msg}"),
      PipelineError::Upstream { code: Some(c), message } => {
        write!(f, "upstream error (code {c}): {message}")
      }
      PipelineError::Upstream { code: None, message } => {
        write!(f, "upstream error: {message}")
      }
      PipelineError::Parse(msg) => write!(f, "parse error: {msg}"),
      PipelineError::MissingSyllabus { grade, subject } => {
        write!(f, "no analyzed syllabus for grade {grade} {subject}")
      }
    }
  }
}

impl std::error::Error for PipelineError {}

impl PipelineError {
  /// Transient upstream conditions worth retrying on the vision path.
  pub fn is_retryable_for_vision(&self) -> bool {
    match self {
      PipelineError::Transport(_) => true,
      PipelineError::Upstream { code: Some(c), .. } => matches!(c, 429 | 502 | 503),
      _ => false,
    }
  }
}
