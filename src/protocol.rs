//! Public request/response structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::QuestionBlock;
use crate::grading::ImagePage;

//
// Syllabus
//

#[derive(Debug, Deserialize)]
pub struct AnalyzeSyllabusIn {
  pub syllabus_text: String,
  pub grade: u32,
  #[serde(default = "default_subject")]
  pub subject: String,
}

#[derive(Serialize)]
pub struct AnalyzeSyllabusOut {
  pub success: bool,
  pub data: Value,
}

//
// Worksheets
//

#[derive(Debug, Deserialize)]
pub struct GenerateWorksheetIn {
  pub grade: u32,
  pub title: String,
  pub question_blocks: Vec<QuestionBlock>,
  #[serde(default = "default_subject")]
  pub subject: String,
}

#[derive(Serialize)]
pub struct GenerateWorksheetOut {
  pub success: bool,
  pub message: String,
  pub filename: String,
  pub expected_questions: u32,
}

#[derive(Serialize)]
pub struct WorksheetListOut {
  pub worksheets: Vec<WorksheetEntry>,
}

#[derive(Serialize)]
pub struct WorksheetEntry {
  pub filename: String,
}

//
// Grading
//

#[derive(Debug, Deserialize)]
pub struct GradeTextIn {
  pub grade: u32,
  pub subject: String,
  pub worksheet_title: String,
  pub student_answers: String,
  #[serde(default)]
  pub answer_key: Option<String>,
  #[serde(default)]
  pub student_name: Option<String>,
}

#[derive(Deserialize)]
pub struct GradeVisionIn {
  pub grade: u32,
  pub subject: String,
  pub worksheet_title: String,
  pub images: Vec<ImagePage>,
  #[serde(default)]
  pub answer_key: Option<String>,
  #[serde(default)]
  pub student_name: Option<String>,
}

#[derive(Serialize)]
pub struct GradeOut {
  pub success: bool,
  pub data: Value,
}

//
// Shared envelopes
//

#[derive(Serialize)]
pub struct ErrorOut {
  pub success: bool,
  pub error: String,
}

impl ErrorOut {
  pub fn new(message: impl Into<String>) -> Self {
    Self { success: false, error: message.into() }
  }
}

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
}

fn default_subject() -> String {
  "Math".into()
}
