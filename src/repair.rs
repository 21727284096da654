//! Recovering a JSON value from a raw model response.
//!
//! Steps:
//! 1) Strip fenced code-block markers.
//! 2) Cut out the first top-level object, or an array that is the whole payload
//!    (balanced scan, greedy fallback).
//! 3) Parse.
//! 4) On failure: escape stray quotes inside strings, drop trailing commas, parse once more.
//!
//! Only those two repairs exist. Anything else the generator breaks should
//! surface as a `LessonError::Parse` so it gets retried, not patched here.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::LessonError;
use crate::util::trunc_for_log;

fn fence_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("valid fence regex"))
}

#[instrument(level = "debug", skip(raw), fields(raw_len = raw.len()))]
pub fn repair_and_parse(raw: &str) -> Result<Value, LessonError> {
  let unfenced = strip_fences(raw);
  let candidate = extract_json_block(&unfenced)
    .ok_or_else(|| LessonError::Parse(format!("no JSON object found in response: {}", trunc_for_log(raw.trim(), 120))))?;

  match serde_json::from_str::<Value>(candidate) {
    Ok(v) => Ok(v),
    Err(first) => {
      debug!(target: "pipeline", error = %first, "Direct parse failed; applying repairs");
      let repaired = remove_trailing_commas(&escape_stray_quotes(candidate));
      serde_json::from_str::<Value>(&repaired).map_err(|e| {
        warn!(target: "pipeline", error = %e, preview = %trunc_for_log(&repaired, 200), "Repaired response still invalid");
        LessonError::Parse(e.to_string())
      })
    }
  }
}

/// Return the body of the first fenced block, or the input with stray fence markers removed.
pub fn strip_fences(raw: &str) -> String {
  if let Some(body) = fence_re().captures(raw).and_then(|c| c.get(1)) {
    return body.as_str().trim().to_string();
  }
  raw.replace("```", "").trim().to_string()
}

/// First top-level `{...}` object. An array is taken only when it is the
/// payload itself: it opens before the first `{` and encloses it, or the
/// text has no `{` at all.
/// Falls back to the last matching closer when the brackets never balance.
pub fn extract_json_block(text: &str) -> Option<&str> {
  let start = match (text.find('{'), text.find('[')) {
    (Some(obj), Some(arr)) if arr < obj => match balanced_end(text, arr) {
      Some(end) if end > obj => arr,
      _ => obj,
    },
    (Some(obj), _) => obj,
    (None, Some(arr)) => arr,
    (None, None) => return None,
  };

  if let Some(end) = balanced_end(text, start) {
    return Some(&text[start..end]);
  }
  let close = if text[start..].starts_with('{') { '}' } else { ']' };
  let end = text.rfind(close)?;
  if end > start { Some(&text[start..=end]) } else { None }
}

/// Byte offset just past the bracket closing the one at `start`, skipping string contents.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
  let mut depth = 0usize;
  let mut in_string = false;
  let mut escaped = false;
  for (offset, ch) in text[start..].char_indices() {
    if in_string {
      if escaped {
        escaped = false;
      } else if ch == '\\' {
        escaped = true;
      } else if ch == '"' {
        in_string = false;
      }
      continue;
    }
    match ch {
      '"' => in_string = true,
      '{' | '[' => depth += 1,
      '}' | ']' => {
        depth = depth.saturating_sub(1);
        if depth == 0 {
          return Some(start + offset + ch.len_utf8());
        }
      }
      _ => {}
    }
  }
  None
}

/// Escape `"` characters that sit inside a string value but cannot be its
/// closing quote (the next non-space character is not `,` `}` `]` or `:`).
pub fn escape_stray_quotes(text: &str) -> String {
  let chars: Vec<char> = text.chars().collect();
  let mut out = String::with_capacity(text.len() + 8);
  let mut in_string = false;
  let mut escaped = false;

  for (i, &ch) in chars.iter().enumerate() {
    if !in_string {
      if ch == '"' {
        in_string = true;
      }
      out.push(ch);
      continue;
    }
    if escaped {
      escaped = false;
      out.push(ch);
      continue;
    }
    match ch {
      '\\' => {
        escaped = true;
        out.push(ch);
      }
      '"' => {
        let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
        match next {
          None | Some(',') | Some('}') | Some(']') | Some(':') => {
            in_string = false;
            out.push('"');
          }
          Some(_) => out.push_str("\\\""),
        }
      }
      _ => out.push(ch),
    }
  }
  out
}

/// Drop a `,` whose next non-space character is `}` or `]`. String contents are left untouched.
pub fn remove_trailing_commas(text: &str) -> String {
  let chars: Vec<char> = text.chars().collect();
  let mut out = String::with_capacity(text.len());
  let mut in_string = false;
  let mut escaped = false;

  for (i, &ch) in chars.iter().enumerate() {
    if in_string {
      if escaped {
        escaped = false;
      } else if ch == '\\' {
        escaped = true;
      } else if ch == '"' {
        in_string = false;
      }
      out.push(ch);
      continue;
    }
    match ch {
      '"' => {
        in_string = true;
        out.push(ch);
      }
      ',' => {
        let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
        if !matches!(next, Some('}') | Some(']')) {
          out.push(ch);
        }
      }
      _ => out.push(ch),
    }
  }
  out
}
