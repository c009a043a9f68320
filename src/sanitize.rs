//! Extracting a parseable payload from a raw model response.
//!
//! Models routinely wrap their output in markdown code fences and surround
//! JSON with prose. Cleanup happens in two stages: fence stripping, then
//! brace-bounded extraction. Neither stage validates the result; a parse
//! failure downstream is reported separately so callers can tell "no
//! response" apart from "unparseable response".

/// Strip a leading/trailing triple-backtick fence if present.
/// A language tag immediately after the opening fence (e.g. `json`, `html`)
/// is skipped as well. Content without a fence passes through untouched.
pub fn strip_code_fence(raw: &str) -> String {
  let content = raw.trim();
  if !content.starts_with("```") {
    return content.to_string();
  }

  // Take what sits between the opening fence and the closing fence (or the
  // end of the string when the model forgot to close it).
  let inner = &content[3..];
  let inner = match inner.find("```") {
    Some(end) => &inner[..end],
    None => inner,
  };
  let mut inner = inner.trim();

  for tag in ["json", "html"] {
    if let Some(rest) = inner.strip_prefix(tag) {
      inner = rest.trim_start();
      break;
    }
  }
  inner.trim().to_string()
}

/// Narrow to the substring from the first `{` to the last `}` inclusive,
/// tolerating prose the model may have added around the JSON object.
/// Returns `None` when no such span exists.
pub fn extract_json_object(s: &str) -> Option<&str> {
  let start = s.find('{')?;
  let end = s.rfind('}')?;
  if end < start {
    return None;
  }
  Some(&s[start..=end])
}

/// Convenience for JSON-expecting callers: fence strip, then brace-bound.
pub fn sanitize_json(raw: &str) -> Option<String> {
  let stripped = strip_code_fence(raw);
  extract_json_object(&stripped).map(|s| s.to_string())
}
