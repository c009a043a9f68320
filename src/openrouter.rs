//! Minimal OpenRouter client for our use-cases.
//!
//! We only call chat.completions, always with exactly one user-role message.
//! Text operations (syllabus analysis, worksheet generation, text grading)
//! send a plain string; vision grading sends an ordered list of content parts
//! (one text instruction followed by inline base64 images). Calls are
//! instrumented and log model names, attempt counts, and token usage
//! (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::domain::{PipelineError, Usage};
use crate::util::trunc_for_log;

pub const DEFAULT_TEXT_MODEL: &str = "google/gemma-3-27b-it:free";
pub const DEFAULT_VISION_MODEL: &str = "nvidia/nemotron-nano-12b-v2-vl:free";

/// Vision calls tolerate transient provider failures: up to 3 sequential
/// attempts with a fixed pause between them. Text calls are single-shot.
const VISION_MAX_ATTEMPTS: u32 = 3;
const VISION_RETRY_PAUSE: Duration = Duration::from_secs(2);
const VISION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct OpenRouter {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub text_model: String,
  pub vision_model: String,
}

/// Raw gateway result: the model's content string plus usage counters.
#[derive(Clone, Debug)]
pub struct RawModelResponse {
  pub content: String,
  pub usage: Usage,
}

impl OpenRouter {
  /// Construct the client if we find OPENROUTER_API_KEY; otherwise None.
  /// Text requests rely on the client's default timeout behavior.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENROUTER_API_KEY").ok()?;
    let base_url = std::env::var("OPENROUTER_BASE_URL")
      .unwrap_or_else(|_| "https://openrouter.ai/api/v1".into());
    let text_model =
      std::env::var("OPENROUTER_TEXT_MODEL").unwrap_or_else(|_| DEFAULT_TEXT_MODEL.into());
    let vision_model =
      std::env::var("OPENROUTER_VISION_MODEL").unwrap_or_else(|_| DEFAULT_VISION_MODEL.into());

    let client = reqwest::Client::builder().build().ok()?;

    Some(Self { client, api_key, base_url, text_model, vision_model })
  }

  /// Single-shot chat completion with a plain-text user message.
  /// No retry: a failed call surfaces as failure immediately.
  #[instrument(level = "info", skip(self, prompt), fields(%operation, model = %model, prompt_len = prompt.len()))]
  pub async fn invoke_text(
    &self,
    operation: &str,
    prompt: &str,
    model: &str,
    temperature: f32,
    max_tokens: u32,
  ) -> Result<RawModelResponse, PipelineError> {
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![ChatMessageReq {
        role: "user".into(),
        content: MessageContent::Text(prompt.to_string()),
      }],
      temperature,
      max_tokens,
    };
    self.single_call(operation, &req, None).await
  }

  /// Multi-part (vision) chat completion with bounded retry. Transport
  /// failures and upstream codes 429/502/503 are retried with a fixed
  /// pause; every other failure is terminal on the spot.
  #[instrument(level = "info", skip(self, parts), fields(%operation, model = %model, part_count = parts.len()))]
  pub async fn invoke_vision(
    &self,
    operation: &str,
    parts: Vec<ContentPart>,
    model: &str,
    temperature: f32,
    max_tokens: u32,
  ) -> Result<RawModelResponse, PipelineError> {
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![ChatMessageReq { role: "user".into(), content: MessageContent::Parts(parts) }],
      temperature,
      max_tokens,
    };

    let mut attempt = 1;
    loop {
      if attempt > 1 {
        info!(target: "grading", attempt, max = VISION_MAX_ATTEMPTS, "Retrying upstream call");
      }
      match self.single_call(operation, &req, Some(VISION_TIMEOUT)).await {
        Ok(res) => return Ok(res),
        Err(e) if e.is_retryable_for_vision() && attempt < VISION_MAX_ATTEMPTS => {
          warn!(target: "grading", attempt, error = %e, "Transient upstream failure; will retry");
          tokio::time::sleep(VISION_RETRY_PAUSE).await;
          attempt += 1;
        }
        Err(e) => {
          error!(target: "grading", attempt, error = %e, "Upstream call failed");
          return Err(e);
        }
      }
    }
  }

  /// One HTTP round-trip, with the three failure layers told apart:
  /// transport, upstream error envelope, malformed success envelope.
  async fn single_call(
    &self,
    operation: &str,
    req: &ChatCompletionRequest,
    timeout: Option<Duration>,
  ) -> Result<RawModelResponse, PipelineError> {
    let url = format!("{}/chat/completions", self.base_url);

    let mut builder = self
      .client
      .post(&url)
      .header(USER_AGENT, "worksheetforge-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(req);
    if let Some(t) = timeout {
      builder = builder.timeout(t);
    }

    let res = builder.send().await.map_err(|e| PipelineError::Transport(e.to_string()))?;

    let status = res.status();
    let body = res.text().await.map_err(|e| PipelineError::Transport(e.to_string()))?;

    if !status.is_success() {
      let (code, message) = extract_error_envelope(&body)
        .unwrap_or_else(|| (None, trunc_for_log(&body, 300)));
      return Err(PipelineError::Upstream { code: code.or(Some(status.as_u16())), message });
    }

    // Providers also report failures inside a 200 body.
    if let Some((code, message)) = extract_error_envelope(&body) {
      return Err(PipelineError::Upstream { code, message });
    }

    let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|_| {
      PipelineError::Upstream {
        code: None,
        message: format!("unexpected response shape: {}", trunc_for_log(&body, 300)),
      }
    })?;

    let Some(choice) = parsed.choices.first() else {
      return Err(PipelineError::Upstream {
        code: None,
        message: "response contained no choices".into(),
      });
    };

    let usage = parsed.usage.unwrap_or_default();
    info!(
      target: "worksheetforge_backend",
      %operation,
      prompt_tokens = usage.prompt_tokens,
      completion_tokens = usage.completion_tokens,
      total_tokens = usage.total_tokens,
      "OpenRouter usage"
    );

    Ok(RawModelResponse {
      content: choice.message.content.clone().unwrap_or_default(),
      usage,
    })
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessageReq {
  role: String,
  content: MessageContent,
}

/// Either a plain string or an ordered sequence of typed parts.
#[derive(Serialize)]
#[serde(untagged)]
pub enum MessageContent {
  Text(String),
  Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
  Text { text: String },
  ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
pub struct ImageUrl {
  pub url: String,
}

impl ContentPart {
  pub fn text(text: impl Into<String>) -> Self {
    ContentPart::Text { text: text.into() }
  }

  /// Inline an image as a data URI content part.
  pub fn inline_image(mime_type: &str, base64_data: &str) -> Self {
    ContentPart::ImageUrl {
      image_url: ImageUrl { url: format!("data:{mime_type};base64,{base64_data}") },
    }
  }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
  #[serde(default)]
  choices: Vec<ChatChoice>,
  #[serde(default)]
  usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
  message: ChatMessageResp,
}

#[derive(Deserialize)]
struct ChatMessageResp {
  content: Option<String>,
}

/// Try to extract a clean (code, message) pair from an upstream error body.
/// Codes may arrive as numbers; anything else maps to None.
fn extract_error_envelope(body: &str) -> Option<(Option<u16>, String)> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EObj,
  }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
  }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => {
      let code = w.error.code.as_ref().and_then(|v| v.as_u64()).map(|c| c as u16);
      Some((code, w.error.message))
    }
    Err(_) => None,
  }
}
