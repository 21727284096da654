//! Conversion of the legacy `task_type` + `blocks` task shape into the canonical one.
//!
//! Older generator prompts produced every task as a flat list of typed blocks:
//!   {"task_id": 1, "task_type": "vocabulary", "blocks": [{"type": "card", ...}, ...]}
//! The shape normalizer hands such tasks to a `LegacyTaskTransformer` and treats it as a black box.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::domain::TaskKind;

pub trait LegacyTaskTransformer: Send + Sync {
  fn transform(&self, task: Value) -> Value;
}

/// Default transformer: routes blocks into the per-kind payload field.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlocksToCanonical;

impl LegacyTaskTransformer for BlocksToCanonical {
  fn transform(&self, task: Value) -> Value {
    let Value::Object(mut obj) = task else { return task };

    let label = obj
      .remove("task_type")
      .and_then(|v| v.as_str().map(str::to_string))
      .unwrap_or_default();
    let blocks = match obj.remove("blocks") {
      Some(Value::Array(b)) => b,
      _ => Vec::new(),
    };

    let Some(kind) = TaskKind::from_label(&label) else {
      debug!(target: "pipeline", %label, "Unknown legacy task_type; keeping blocks untouched");
      obj.insert("type".into(), Value::String(label));
      obj.insert("blocks".into(), Value::Array(blocks));
      return Value::Object(obj);
    };
    obj.insert("type".into(), Value::String(kind.label().into()));

    match kind {
      TaskKind::Vocabulary => {
        let cards: Vec<Value> = blocks.into_iter().map(|b| unwrap_payload(b, &["card", "data"])).collect();
        obj.insert("content".into(), json!({ "cards": cards }));
      }
      TaskKind::Rules => {
        let blocks: Vec<Value> = blocks.into_iter().map(rename_block_keys).collect();
        obj.insert("blocks".into(), Value::Array(blocks));
      }
      TaskKind::Listening | TaskKind::Attention => {
        let items: Vec<Value> = blocks.into_iter().map(|b| unwrap_payload(b, &["item", "data"])).collect();
        obj.insert("items".into(), Value::Array(items));
      }
      TaskKind::Writing => fold_writing_blocks(&mut obj, blocks),
    }

    Value::Object(obj)
  }
}

/// `{"type": "card", "card": {...}}` -> `{...}`; plain objects lose only their `type` tag.
fn unwrap_payload(block: Value, keys: &[&str]) -> Value {
  let Value::Object(mut m) = block else { return block };
  for key in keys {
    if let Some(inner @ Value::Object(_)) = m.remove(*key) {
      return inner;
    }
  }
  m.remove("type");
  Value::Object(m)
}

fn rename_block_keys(block: Value) -> Value {
  let Value::Object(mut m) = block else { return block };
  if !m.contains_key("block_id") {
    if let Some(id) = m.remove("id") {
      m.insert("block_id".into(), id);
    }
  }
  if !m.contains_key("variant") {
    if let Some(t) = m.remove("type") {
      m.insert("variant".into(), t);
    }
  }
  Value::Object(m)
}

fn fold_writing_blocks(obj: &mut Map<String, Value>, blocks: Vec<Value>) {
  let mut template: Vec<Value> = Vec::new();
  let mut hints: Vec<Value> = Vec::new();

  for block in blocks {
    let Value::Object(mut m) = block else { continue };
    let kind = m.get("type").and_then(Value::as_str).unwrap_or("").to_string();
    match kind.as_str() {
      "instruction" => {
        if let Some(text) = m.remove("text") {
          obj.insert("instruction".into(), text);
        }
      }
      "template" => match m.remove("lines").or_else(|| m.remove("text")) {
        Some(Value::Array(lines)) => template.extend(lines),
        Some(line) => template.push(line),
        None => {}
      },
      "hint" => {
        if let Some(text) = m.remove("text") {
          hints.push(text);
        }
      }
      "example" => {
        if let Some(text) = m.remove("text").or_else(|| m.remove("lines")) {
          obj.insert("example".into(), text);
        }
      }
      // Bare segments (text/input/newline) belong to the template.
      _ => template.push(Value::Object(m)),
    }
  }

  obj.insert("template".into(), Value::Array(template));
  if !hints.is_empty() {
    obj.insert("hints".into(), Value::Array(hints));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn vocabulary_blocks_become_cards() {
    let legacy = json!({
      "task_id": 1,
      "task_type": "vocabulary",
      "blocks": [
        {"type": "card", "card": {"word": "casa"}},
        {"type": "card", "word": "rua"}
      ]
    });
    let out = BlocksToCanonical.transform(legacy);
    assert_eq!(out["type"], json!("vocabulary"));
    assert_eq!(out["content"]["cards"], json!([{"word": "casa"}, {"word": "rua"}]));
    assert!(out.get("task_type").is_none());
  }

  #[test]
  fn rules_blocks_rename_id_and_type() {
    let legacy = json!({"task_type": "grammar", "blocks": [{"id": "rule", "type": "explanation"}]});
    let out = BlocksToCanonical.transform(legacy);
    assert_eq!(out["type"], json!("rules"));
    assert_eq!(out["blocks"], json!([{"block_id": "rule", "variant": "explanation"}]));
  }

  #[test]
  fn writing_blocks_fold_into_fields() {
    let legacy = json!({
      "task_type": "writing",
      "blocks": [
        {"type": "instruction", "text": {"ru": "Заполните", "en": "Fill in"}},
        {"type": "template", "lines": ["Eu ___ café."]},
        {"type": "hint", "text": "beber"},
        {"type": "example", "text": "Eu bebo café."}
      ]
    });
    let out = BlocksToCanonical.transform(legacy);
    assert_eq!(out["type"], json!("writing-optional"));
    assert_eq!(out["template"], json!(["Eu ___ café."]));
    assert_eq!(out["hints"], json!(["beber"]));
    assert_eq!(out["example"], json!("Eu bebo café."));
    assert_eq!(out["instruction"]["en"], json!("Fill in"));
  }
}
