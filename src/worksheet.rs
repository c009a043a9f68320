//! Worksheet prompt assembly and generation.
//!
//! The assembler turns an ordered list of teacher-specified question blocks
//! into a fenced stream of natural-language section instructions, allocating
//! unique chart element ids along the way, and computes the expected question
//! total for the point count. The generation pipeline renders the worksheet
//! prompt, calls the gateway once (no retry), strips the code fence, and
//! substitutes the result into the worksheet HTML template.

use tracing::{info, instrument};

use crate::config::PromptConfig;
use crate::domain::{estimated_cost, ChartCounters, PipelineError, QuestionBlock, SyllabusDocument, Usage};
use crate::openrouter::OpenRouter;
use crate::sanitize::strip_code_fence;
use crate::store::{FileStore, StoreKey};
use crate::syllabus;
use crate::util::fill_template;

/// Used when no syllabus document or subtopic match is available, and when a
/// block names no topic at all.
const FALLBACK_TOPIC: &str = "Practice Problems";

/// Fallback page when `templates/worksheet_template.html` is absent. The
/// real template (with the full print CSS) ships alongside the binary; this
/// keeps generation working in a bare checkout.
const FALLBACK_TEMPLATE: &str = "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{{TITLE}}</title>\n</head>\n<body>\n<h1>{{TITLE}}</h1>\n<p class=\"points\">Total points: {{TOTAL_POINTS}}</p>\n{{CONTENT}}\n</body>\n</html>\n";

pub struct AssembledSections {
  pub instructions: String,
  /// Sum of question counts over non-chart blocks (nested sub-block counts
  /// included). Surfaced for the point total; never verified against what
  /// the model actually produced.
  pub expected_questions: u32,
}

pub struct GeneratedWorksheet {
  pub html: String,
  pub filename: String,
  pub expected_questions: u32,
  pub usage: Usage,
}

/// Render the per-block instruction stream. Every block gets a
/// `--- SECTION n START/END ---` fence pair carrying its 1-based position,
/// so the stream is an unambiguous, re-parseable sequence.
pub fn assemble_sections(
  blocks: &[QuestionBlock],
  syllabus: Option<&SyllabusDocument>,
) -> AssembledSections {
  let mut counters = ChartCounters::default();
  let mut out = Vec::new();

  for (i, block) in blocks.iter().enumerate() {
    let idx = i + 1;
    let topic_name = resolve_topic_name(block, syllabus);

    out.push(format!("\n--- SECTION {idx} START ---"));
    out.push(format!("Output: <h2>{idx}. {topic_name}</h2>"));

    if block.is_chart() {
      out.push(chart_instruction(&block.kind, &mut counters));
    } else if block.continuous && !block.sub_blocks.is_empty() {
      // One shared context for the whole section; sub-blocks all ask
      // questions against it.
      out.push(format!(
        "Output: ONE shared context (a single scenario, chart, or passage) about '{topic_name}' that all questions in this section refer to"
      ));
      let mut section_total = 0u32;
      for sub in &block.sub_blocks {
        let count = sub.count.unwrap_or(1);
        section_total += count;
        out.push(format!(
          "Output: {} referring to the shared context above",
          question_phrase(sub, &topic_name)
        ));
      }
      out.push(stop_instruction(section_total));
    } else if !block.sub_blocks.is_empty() {
      // Discrete mode: each sub-block is fully independent.
      for sub in &block.sub_blocks {
        out.push(format!("Output: {}", question_phrase(sub, &topic_name)));
        out.push(stop_instruction(sub.count.unwrap_or(1)));
      }
    } else {
      out.push(format!("Output: {}", question_phrase(block, &topic_name)));
      out.push(stop_instruction(block.count.unwrap_or(1)));
    }

    out.push(format!("--- SECTION {idx} END ---\n"));
  }

  AssembledSections {
    instructions: out.join("\n"),
    expected_questions: expected_question_total(blocks),
  }
}

fn resolve_topic_name(block: &QuestionBlock, syllabus: Option<&SyllabusDocument>) -> String {
  if let Some(id) = &block.subtopic_id {
    return syllabus
      .and_then(|doc| doc.find_subtopic(id))
      .map(|s| s.name.clone())
      .unwrap_or_else(|| FALLBACK_TOPIC.to_string());
  }
  block.topic_name.clone().unwrap_or_else(|| FALLBACK_TOPIC.to_string())
}

fn chart_instruction(kind: &str, counters: &mut ChartCounters) -> String {
  match kind {
    "bar_chart" => "Output: CSS bar chart (5 bars)".to_string(),
    "pie_chart" => {
      format!("Output: Google pie chart with id='{}' (4 items)", counters.next_pie_id())
    }
    "line_chart" => {
      format!("Output: Google line chart with id='{}' (5 days)", counters.next_line_id())
    }
    // data_table
    _ => "Output: Data table (4 rows)".to_string(),
  }
}

/// "EXACTLY 5 short_answer question(s) about 'Place value' (4 options)
/// [difficulty: easy]" — with singular phrasing when the count is one and a
/// format reminder for the time-telling types the model keeps rewording.
fn question_phrase(block: &QuestionBlock, topic_name: &str) -> String {
  let count = block.count.unwrap_or(1);
  let mut desc = if count == 1 {
    format!("EXACTLY ONE {} question", block.kind)
  } else {
    format!("EXACTLY {count} {} question(s)", block.kind)
  };
  desc.push_str(&format!(" about '{topic_name}'"));

  if block.kind == "draw_time" || block.kind == "tell_time" {
    desc.push_str(&format!(
      " - USE ONLY THE {} FORMAT, NO WORD PROBLEMS",
      block.kind.to_uppercase()
    ));
  }
  if let Some(options) = block.options {
    desc.push_str(&format!(" ({options} options)"));
  }
  if let Some(difficulty) = &block.difficulty {
    desc.push_str(&format!(" [difficulty: {difficulty}]"));
  }
  desc
}

fn stop_instruction(count: u32) -> String {
  format!("STOP AFTER {count} QUESTION(S) - DO NOT ADD MORE")
}

/// Sum of counts over non-chart blocks; a block with sub-blocks contributes
/// the sum of its non-chart sub-block counts instead of its own. Blocks
/// without an explicit count contribute nothing to the total (even though
/// they still render one question).
fn expected_question_total(blocks: &[QuestionBlock]) -> u32 {
  blocks
    .iter()
    .filter(|b| !b.is_chart())
    .map(|b| {
      if b.sub_blocks.is_empty() {
        b.count.unwrap_or(0)
      } else {
        b.sub_blocks.iter().filter(|s| !s.is_chart()).map(|s| s.count.unwrap_or(0)).sum()
      }
    })
    .sum()
}

fn uses_syllabus_lookup(blocks: &[QuestionBlock]) -> bool {
  blocks
    .iter()
    .any(|b| b.subtopic_id.is_some() || b.sub_blocks.iter().any(|s| s.subtopic_id.is_some()))
}

/// Generate a worksheet and persist it as HTML under
/// `worksheets/grade{g}_{safe_title}.html`.
#[instrument(level = "info", skip(gateway, prompts, store, blocks), fields(block_count = blocks.len()))]
pub async fn generate(
  gateway: &OpenRouter,
  prompts: &PromptConfig,
  store: &FileStore,
  grade: u32,
  title: &str,
  blocks: &[QuestionBlock],
  subject: &str,
) -> Result<GeneratedWorksheet, PipelineError> {
  let syllabus_doc = syllabus::load(store, grade, subject);
  if syllabus_doc.is_none() && uses_syllabus_lookup(blocks) {
    return Err(PipelineError::MissingSyllabus { grade, subject: subject.to_string() });
  }

  let assembled = assemble_sections(blocks, syllabus_doc.as_ref());

  let op = &prompts.worksheet;
  let prompt = fill_template(
    &op.system_prompt,
    &[
      ("grade", &grade.to_string()),
      ("topic", title),
      ("section_instructions", &assembled.instructions),
    ],
  );

  info!(target: "worksheet", grade, title, "Generating worksheet");
  let response = gateway
    .invoke_text("worksheet", &prompt, &gateway.text_model, op.temperature, op.max_tokens)
    .await?;

  let content = strip_code_fence(&response.content);

  let template = std::fs::read_to_string("templates/worksheet_template.html")
    .unwrap_or_else(|_| FALLBACK_TEMPLATE.to_string());
  let full_title = format!("Grade {grade} {subject} - {title}");
  let html = template
    .replace("{{TITLE}}", &full_title)
    .replace("{{CONTENT}}", &content)
    .replace("{{TOTAL_POINTS}}", &assembled.expected_questions.to_string());

  let key = StoreKey::Worksheet { grade, title: title.to_string() };
  let path = store
    .put(&key, &html)
    .map_err(|e| PipelineError::Parse(format!("write worksheet: {e}")))?;
  let filename = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();

  info!(
    target: "worksheet",
    grade,
    title,
    path = %path.display(),
    expected_questions = assembled.expected_questions,
    prompt_tokens = response.usage.prompt_tokens,
    completion_tokens = response.usage.completion_tokens,
    total_tokens = response.usage.total_tokens,
    cost_usd = format!("{:.6}", estimated_cost(&gateway.text_model, &response.usage)),
    "Worksheet generated"
  );

  Ok(GeneratedWorksheet {
    html,
    filename,
    expected_questions: assembled.expected_questions,
    usage: response.usage,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Subtopic, Topic};

  fn block(kind: &str, count: Option<u32>) -> QuestionBlock {
    QuestionBlock { kind: kind.into(), count, ..Default::default() }
  }

  fn sample_syllabus() -> SyllabusDocument {
    SyllabusDocument {
      grade: 3,
      subject: "Math".into(),
      topics: vec![Topic {
        name: "Numbers".into(),
        subtopics: vec![Subtopic {
          id: "num_1".into(),
          name: "Place value".into(),
          difficulty: None,
          description: None,
        }],
      }],
      metadata: None,
    }
  }

  #[test]
  fn totals_skip_charts_and_match_scenario() {
    let blocks = vec![
      block("short_answer", Some(5)),
      block("pie_chart", None),
      QuestionBlock { options: Some(4), ..block("multiple_choice", Some(3)) },
    ];
    let assembled = assemble_sections(&blocks, None);
    assert_eq!(assembled.expected_questions, 8);
    // Exactly one pie chart id, starting at zero.
    assert!(assembled.instructions.contains("id='piechart_0'"));
    assert!(!assembled.instructions.contains("id='piechart_1'"));
  }

  #[test]
  fn chart_ids_never_repeat_when_interleaved() {
    let blocks = vec![
      block("pie_chart", None),
      block("short_answer", Some(2)),
      block("line_chart", None),
      block("pie_chart", None),
      block("line_chart", None),
    ];
    let assembled = assemble_sections(&blocks, None);
    for id in ["piechart_0", "piechart_1", "linechart_0", "linechart_1"] {
      assert_eq!(assembled.instructions.matches(&format!("id='{id}'")).count(), 1, "{id}");
    }
  }

  #[test]
  fn every_block_is_fenced_with_its_position() {
    let blocks = vec![block("short_answer", Some(2)), block("data_table", None)];
    let assembled = assemble_sections(&blocks, None);
    for fence in [
      "--- SECTION 1 START ---",
      "--- SECTION 1 END ---",
      "--- SECTION 2 START ---",
      "--- SECTION 2 END ---",
    ] {
      assert!(assembled.instructions.contains(fence), "missing {fence}");
    }
    assert!(assembled.instructions.contains("Data table (4 rows)"));
  }

  #[test]
  fn subtopic_ids_resolve_through_the_syllabus() {
    let doc = sample_syllabus();
    let blocks = vec![QuestionBlock {
      subtopic_id: Some("num_1".into()),
      ..block("word_problem", Some(2))
    }];
    let assembled = assemble_sections(&blocks, Some(&doc));
    assert!(assembled.instructions.contains("about 'Place value'"));

    // Unknown id and missing document both fall back.
    let blocks = vec![QuestionBlock { subtopic_id: Some("nope".into()), ..block("word_problem", Some(2)) }];
    assert!(assemble_sections(&blocks, Some(&doc)).instructions.contains("about 'Practice Problems'"));
    assert!(assemble_sections(&blocks, None).instructions.contains("about 'Practice Problems'"));
  }

  #[test]
  fn singular_count_uses_singular_phrasing() {
    let assembled = assemble_sections(&[block("short_answer", Some(1))], None);
    assert!(assembled.instructions.contains("EXACTLY ONE short_answer question"));
    assert!(assembled.instructions.contains("STOP AFTER 1 QUESTION(S)"));
  }

  #[test]
  fn time_types_get_a_format_reminder() {
    let assembled = assemble_sections(&[block("tell_time", Some(3))], None);
    assert!(assembled.instructions.contains("USE ONLY THE TELL_TIME FORMAT, NO WORD PROBLEMS"));
  }

  #[test]
  fn qualifiers_are_appended() {
    let blocks = vec![QuestionBlock {
      options: Some(4),
      difficulty: Some("easy".into()),
      topic_name: Some("Shapes".into()),
      ..block("multiple_choice", Some(3))
    }];
    let assembled = assemble_sections(&blocks, None);
    assert!(assembled.instructions.contains("EXACTLY 3 multiple_choice question(s) about 'Shapes' (4 options) [difficulty: easy]"));
  }

  #[test]
  fn continuous_mode_shares_one_context_and_sums_the_stop() {
    let parent = QuestionBlock {
      topic_name: Some("Picnic Data".into()),
      continuous: true,
      sub_blocks: vec![block("multiple_choice", Some(2)), block("short_answer", Some(3))],
      ..block("word_problem", None)
    };
    let assembled = assemble_sections(&[parent], None);
    assert_eq!(assembled.instructions.matches("ONE shared context").count(), 1);
    assert!(assembled.instructions.contains("STOP AFTER 5 QUESTION(S)"));
    // One stop line for the whole section, not one per sub-block.
    assert_eq!(assembled.instructions.matches("STOP AFTER").count(), 1);
    assert_eq!(assembled.expected_questions, 5);
  }

  #[test]
  fn discrete_sub_blocks_render_independently() {
    let parent = QuestionBlock {
      topic_name: Some("Review".into()),
      continuous: false,
      sub_blocks: vec![block("true_false", Some(2)), block("fill_in_blank", Some(4))],
      ..block("word_problem", None)
    };
    let assembled = assemble_sections(&[parent], None);
    assert!(!assembled.instructions.contains("shared context"));
    assert!(assembled.instructions.contains("STOP AFTER 2 QUESTION(S)"));
    assert!(assembled.instructions.contains("STOP AFTER 4 QUESTION(S)"));
    assert_eq!(assembled.expected_questions, 6);
  }

  #[test]
  fn countless_blocks_render_one_question_but_score_zero() {
    let assembled = assemble_sections(&[block("number_line", None)], None);
    assert!(assembled.instructions.contains("EXACTLY ONE number_line question"));
    assert_eq!(assembled.expected_questions, 0);
  }

  #[test]
  fn syllabus_lookup_detection_covers_sub_blocks() {
    assert!(!uses_syllabus_lookup(&[block("short_answer", Some(1))]));
    let nested = QuestionBlock {
      sub_blocks: vec![QuestionBlock { subtopic_id: Some("x".into()), ..block("short_answer", Some(1)) }],
      ..block("word_problem", None)
    };
    assert!(uses_syllabus_lookup(&[nested]));
  }

  #[test]
  fn fallback_template_substitutes_all_placeholders() {
    let html = FALLBACK_TEMPLATE
      .replace("{{TITLE}}", "Grade 3 Math - Review")
      .replace("{{CONTENT}}", "<h2>1. Review</h2>")
      .replace("{{TOTAL_POINTS}}", "8");
    assert!(!html.contains("{{"));
    assert!(html.contains("Total points: 8"));
  }
}
