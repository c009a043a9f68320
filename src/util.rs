//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Worksheet-title to filename stem: keep alphanumerics, space, `-`, `_`;
/// everything else becomes `_`. Spaces then collapse to `_` and the result
/// is lowercased.
pub fn sanitize_title(title: &str) -> String {
  title
    .chars()
    .map(|c| if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' { c } else { '_' })
    .collect::<String>()
    .replace(' ', "_")
    .to_lowercase()
}

/// Student-name to filename stem: alphanumerics pass through, everything
/// else (including spaces and hyphens) becomes `_`.
pub fn sanitize_student_name(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_alphanumeric() { c } else { '_' })
    .collect()
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  // Cut on a char boundary at or below `max`.
  let cut = s
    .char_indices()
    .map(|(i, _)| i)
    .take_while(|i| *i <= max)
    .last()
    .unwrap_or(0);
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}
