//! Mapping every accepted response shape onto the canonical `Lesson`.
//!
//! Works on the untyped `serde_json::Value` first (where the permissive
//! repairs live), then decodes each task into its typed variant. The function
//! is total: a task that still cannot be decoded becomes an empty task of the
//! expected kind, which the structural validator then reports.
//!
//! Order of work:
//! 1) find the task list (`tasks`, `day.tasks`, or a bare array)
//! 2) convert legacy `task_type` + `blocks` tasks through the collaborator
//! 3) alias legacy type labels
//! 4) sort by task_id, re-index 1..N, keep at most 5
//! 5) infer missing types from position
//! 6) per-kind repairs, then typed decode

use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};

use crate::domain::{
  expected_variant, BlockVariant, Lesson, RulesBlock, Task, TaskKind, VocabularyCard, BLANK_MARKER,
  DEFAULT_EXAMPLE_BUTTON, RULES_LAYOUT, TASK_COUNT,
};
use crate::legacy::LegacyTaskTransformer;

/// Stand-in for a writing blank whose hint the generator forgot.
pub const PLACEHOLDER_HINT: &str = "…";

const ANSWERS_BLOCK_ID: &str = "answers";
const MAX_REINFORCEMENT_TASKS: usize = 2;

#[instrument(level = "debug", skip_all)]
pub fn normalize_lesson(parsed: Value, legacy: &dyn LegacyTaskTransformer) -> Lesson {
  let mut tasks: Vec<Value> = extract_tasks(parsed)
    .into_iter()
    .filter(|t| {
      let keep = t.is_object();
      if !keep {
        warn!(target: "pipeline", "Dropping non-object task entry");
      }
      keep
    })
    .map(|t| if is_legacy_shape(&t) { legacy.transform(t) } else { t })
    .collect();

  for task in tasks.iter_mut() {
    alias_type(task);
  }
  reindex(&mut tasks);

  let tasks = tasks
    .into_iter()
    .enumerate()
    .map(|(pos, task)| normalize_task(task, pos as u8 + 1))
    .collect();

  Lesson { tasks }
}

fn extract_tasks(parsed: Value) -> Vec<Value> {
  match parsed {
    Value::Array(items) => items,
    Value::Object(mut root) => {
      if let Some(Value::Array(tasks)) = root.remove("tasks") {
        return tasks;
      }
      if let Some(Value::Object(mut day)) = root.remove("day") {
        if let Some(Value::Array(tasks)) = day.remove("tasks") {
          debug!(target: "pipeline", "Promoted day.tasks to top level");
          return tasks;
        }
      }
      Vec::new()
    }
    _ => Vec::new(),
  }
}

fn is_legacy_shape(task: &Value) -> bool {
  task.get("type").is_none()
    && task.get("task_type").is_some()
    && task.get("blocks").map_or(false, Value::is_array)
}

fn alias_type(task: &mut Value) {
  let Some(obj) = task.as_object_mut() else { return };
  let Some(label) = obj.get("type").and_then(Value::as_str).map(str::to_string) else { return };
  match TaskKind::from_label(&label) {
    Some(kind) if kind.label() != label => {
      debug!(target: "pipeline", from = %label, to = kind.label(), "Aliased task type");
      obj.insert("type".into(), Value::String(kind.label().into()));
    }
    Some(_) => {}
    None => {
      warn!(target: "pipeline", %label, "Unknown task type; will infer from position");
      obj.remove("type");
    }
  }
}

fn task_id_of(task: &Value) -> Option<u64> {
  match task.get("task_id")? {
    Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn reindex(tasks: &mut Vec<Value>) {
  let mut keyed: Vec<(u64, usize, Value)> = tasks
    .drain(..)
    .enumerate()
    .map(|(i, t)| (task_id_of(&t).unwrap_or(i as u64 + 1), i, t))
    .collect();
  keyed.sort_by_key(|(id, i, _)| (*id, *i));

  if keyed.len() > TASK_COUNT {
    warn!(target: "pipeline", got = keyed.len(), "More than 5 tasks; truncating");
    keyed.truncate(TASK_COUNT);
  }

  for (pos, (_, _, mut task)) in keyed.into_iter().enumerate() {
    let want = pos as u64 + 1;
    if task_id_of(&task) != Some(want) {
      debug!(target: "pipeline", task_id = want, "Re-indexed task");
      if let Some(obj) = task.as_object_mut() {
        obj.insert("task_id".into(), json!(want));
      }
    }
    tasks.push(task);
  }
}

fn normalize_task(mut task: Value, task_id: u8) -> Task {
  let kind = task
    .get("type")
    .and_then(Value::as_str)
    .and_then(TaskKind::from_label)
    .or_else(|| TaskKind::for_task_id(task_id.into()))
    .unwrap_or(TaskKind::Vocabulary);

  if let Some(obj) = task.as_object_mut() {
    if !obj.contains_key("type") {
      debug!(target: "pipeline", task_id, kind = kind.label(), "Inferred task type from position");
      obj.insert("type".into(), Value::String(kind.label().into()));
    }
    coerce_string_fields(obj, &["title"]);
    match kind {
      TaskKind::Vocabulary => normalize_vocabulary(obj),
      TaskKind::Rules => normalize_rules(obj),
      TaskKind::Listening | TaskKind::Attention => normalize_quiz(obj),
      TaskKind::Writing => normalize_writing(obj),
    }
  }

  match serde_json::from_value::<Task>(task) {
    Ok(t) => t,
    Err(e) => {
      warn!(target: "pipeline", task_id, kind = kind.label(), error = %e, "Task does not decode; substituting empty task");
      Task::empty(kind, task_id)
    }
  }
}

// ---------- vocabulary ----------

fn normalize_vocabulary(obj: &mut Map<String, Value>) {
  let mut content = match obj.remove("content") {
    Some(Value::Object(m)) => m,
    Some(Value::Array(cards)) => {
      let mut m = Map::new();
      m.insert("cards".into(), Value::Array(cards));
      m
    }
    _ => Map::new(),
  };
  if !content.contains_key("cards") {
    if let Some(cards @ Value::Array(_)) = obj.remove("cards") {
      content.insert("cards".into(), cards);
    }
  }

  let cards: Vec<Value> = take_array(&mut content, "cards")
    .into_iter()
    .filter_map(|card| match card {
      Value::Object(mut m) => {
        coerce_string_fields(&mut m, &VocabularyCard::REQUIRED_FIELDS);
        Some(Value::Object(m))
      }
      _ => {
        warn!(target: "pipeline", "Dropping non-object vocabulary card");
        None
      }
    })
    .collect();
  content.insert("cards".into(), Value::Array(cards));
  obj.insert("content".into(), Value::Object(content));
}

// ---------- listening / attention ----------

fn normalize_quiz(obj: &mut Map<String, Value>) {
  let items: Vec<Value> = take_array(obj, "items")
    .into_iter()
    .filter_map(|item| match item {
      Value::Object(mut m) => {
        coerce_string_fields(&mut m, &["audio_text", "question", "sentence"]);
        let mut options: Vec<Value> = take_array(&mut m, "options").into_iter().map(normalize_option).collect();
        ensure_single_correct(&mut options);
        m.insert("options".into(), Value::Array(options));
        Some(Value::Object(m))
      }
      _ => {
        warn!(target: "pipeline", "Dropping non-object quiz item");
        None
      }
    })
    .collect();
  obj.insert("items".into(), Value::Array(items));
}

/// Canonical option: bilingual `label`, both correctness flags in sync.
fn normalize_option(option: Value) -> Value {
  let mut m = match option {
    Value::Object(m) => m,
    other => {
      let mut m = Map::new();
      m.insert("label".into(), other);
      m
    }
  };
  let label = m.remove("label").or_else(|| m.remove("text")).unwrap_or(Value::Null);
  m.insert("label".into(), coerce_bilingual(&label));
  sync_correct_flags(&mut m);
  Value::Object(m)
}

fn flag_of(m: &Map<String, Value>, key: &str) -> Option<bool> {
  match m.get(key)? {
    Value::Bool(b) => Some(*b),
    Value::String(s) => match s.trim().to_lowercase().as_str() {
      "true" | "yes" | "1" => Some(true),
      "false" | "no" | "0" => Some(false),
      _ => None,
    },
    Value::Number(n) => n.as_i64().map(|i| i != 0),
    _ => None,
  }
}

/// Copy whichever of `is_correct` / legacy `correct` is set onto the other.
fn sync_correct_flags(m: &mut Map<String, Value>) {
  let flag = flag_of(m, "is_correct").or_else(|| flag_of(m, "correct")).unwrap_or(false);
  m.insert("is_correct".into(), Value::Bool(flag));
  m.insert("correct".into(), Value::Bool(flag));
}

/// Exactly one option flagged correct: first option when none, first flagged when several.
pub fn ensure_single_correct(options: &mut [Value]) {
  let flags: Vec<bool> = options
    .iter()
    .map(|o| o.as_object().and_then(|m| flag_of(m, "is_correct")).unwrap_or(false))
    .collect();
  let correct = flags.iter().filter(|f| **f).count();
  if correct == 1 || options.is_empty() {
    return;
  }

  let keep = if correct == 0 {
    debug!(target: "pipeline", "No option flagged correct; flagging the first");
    0
  } else {
    debug!(target: "pipeline", correct, "Several options flagged correct; keeping the first");
    flags.iter().position(|f| *f).unwrap_or(0)
  };
  for (i, option) in options.iter_mut().enumerate() {
    if let Some(m) = option.as_object_mut() {
      m.insert("is_correct".into(), Value::Bool(i == keep));
      m.insert("correct".into(), Value::Bool(i == keep));
    }
  }
}

// ---------- rules ----------

fn normalize_rules(obj: &mut Map<String, Value>) {
  let blocks: Vec<Value> = take_array(obj, "blocks")
    .into_iter()
    .enumerate()
    .filter_map(|(pos, block)| match block {
      Value::Object(m) => normalize_block(m, pos),
      _ => {
        warn!(target: "pipeline", pos, "Dropping non-object rules block");
        None
      }
    })
    .collect();
  obj.insert("blocks".into(), Value::Array(blocks));
}

fn normalize_block(mut m: Map<String, Value>, pos: usize) -> Option<Value> {
  let block_id = match m.get("block_id").and_then(Value::as_str) {
    Some(id) => id.to_string(),
    None => {
      let id = RULES_LAYOUT
        .get(pos)
        .map(|(id, _)| id.to_string())
        .unwrap_or_else(|| format!("block_{}", pos + 1));
      m.insert("block_id".into(), Value::String(id.clone()));
      id
    }
  };

  if !m.contains_key("variant") {
    let from_alias = m.remove("type").or_else(|| m.remove("kind")).filter(Value::is_string);
    let variant = from_alias.unwrap_or_else(|| {
      Value::String(expected_variant(&block_id).unwrap_or(BlockVariant::Explanation).label().into())
    });
    m.insert("variant".into(), variant);
  }

  if let Some(expected) = expected_variant(&block_id).filter(|v| *v != BlockVariant::Explanation) {
    if m.get("variant").and_then(Value::as_str) != Some(expected.label()) {
      debug!(target: "pipeline", %block_id, variant = expected.label(), "Forced block variant");
      m.insert("variant".into(), Value::String(expected.label().into()));
    }
  }

  coerce_string_fields(&mut m, &["title"]);
  let variant = m.get("variant").and_then(Value::as_str).unwrap_or_default().to_string();
  match variant.as_str() {
    "explanation" => normalize_explanation(&mut m, &block_id),
    "comparison" => {
      let rows: Vec<Value> = take_array(&mut m, "rows")
        .into_iter()
        .filter_map(|row| match row {
          Value::Object(mut r) => {
            coerce_string_fields(&mut r, &["left", "right"]);
            coerce_bilingual_field(&mut r, "note");
            Some(Value::Object(r))
          }
          _ => None,
        })
        .collect();
      m.insert("rows".into(), Value::Array(rows));
    }
    "reinforcement" => {
      let mut tasks = take_array(&mut m, "tasks");
      if tasks.len() > MAX_REINFORCEMENT_TASKS {
        debug!(target: "pipeline", got = tasks.len(), "Trimming reinforcement sub-tasks");
        tasks.truncate(MAX_REINFORCEMENT_TASKS);
      }
      for task in tasks.iter_mut() {
        let Some(t) = task.as_object_mut() else { continue };
        coerce_string_fields(t, &["question"]);
        // normalize_option syncs `correct` / `is_correct` before the single-correct repair.
        let mut options: Vec<Value> = take_array(t, "options").into_iter().map(normalize_option).collect();
        ensure_single_correct(&mut options);
        t.insert("options".into(), Value::Array(options));
      }
      m.insert("tasks".into(), Value::Array(tasks));
    }
    "speak_aloud" => {
      let phrases: Vec<Value> = take_array(&mut m, "phrases")
        .into_iter()
        .map(|phrase| match phrase {
          Value::Object(mut p) => {
            coerce_string_fields(&mut p, &["text"]);
            coerce_bilingual_field(&mut p, "translation");
            Value::Object(p)
          }
          other => json!({ "text": value_to_text(&other) }),
        })
        .collect();
      m.insert("phrases".into(), Value::Array(phrases));
    }
    _ => {}
  }

  let block = Value::Object(m);
  if let Err(e) = serde_json::from_value::<RulesBlock>(block.clone()) {
    warn!(target: "pipeline", %block_id, %variant, error = %e, "Dropping rules block that does not match its variant");
    return None;
  }
  Some(block)
}

fn normalize_explanation(m: &mut Map<String, Value>, block_id: &str) {
  coerce_bilingual_field(m, "text");

  let examples: Vec<Value> = take_array(m, "examples")
    .iter()
    .map(value_to_text)
    .filter(|s| !s.trim().is_empty())
    .map(Value::String)
    .collect();

  let mut hints: Vec<Value> = take_array(m, "hints").iter().map(coerce_bilingual).collect();
  if block_id == ANSWERS_BLOCK_ID && hints.is_empty() {
    debug!(target: "pipeline", examples = examples.len(), "Synthesizing default hints for answers block");
    hints = default_hints(examples.len());
  }

  m.insert("examples".into(), Value::Array(examples));
  m.insert("hints".into(), Value::Array(hints));
}

fn default_hints(examples: usize) -> Vec<Value> {
  if examples == 0 {
    return vec![json!({ "ru": "Вспомните правило урока", "en": "Recall the rule from this lesson" })];
  }
  (1..=examples)
    .map(|n| json!({ "ru": format!("Сравните с примером {n}"), "en": format!("Compare with example {n}") }))
    .collect()
}

// ---------- writing ----------

fn normalize_writing(obj: &mut Map<String, Value>) {
  match obj.remove("instruction") {
    Some(Value::Object(m)) if m.contains_key("text") => {
      obj.insert("instruction".into(), json!({ "text": coerce_bilingual(&m["text"]) }));
    }
    Some(bare @ (Value::Object(_) | Value::String(_))) => {
      debug!(target: "pipeline", "Wrapped bare writing instruction");
      obj.insert("instruction".into(), json!({ "text": coerce_bilingual(&bare) }));
    }
    _ => {}
  }

  let (template, segment_hints) = match obj.remove("template") {
    Some(Value::Array(elements)) => linearize_template(elements),
    Some(Value::String(s)) => (s.lines().map(str::to_string).collect(), Vec::new()),
    _ => (Vec::new(), Vec::new()),
  };

  let mut hints: Vec<String> = take_array(obj, "hints").iter().map(value_to_text).collect();
  if hints.is_empty() && !segment_hints.is_empty() {
    hints = segment_hints
      .into_iter()
      .map(|h| h.unwrap_or_else(|| PLACEHOLDER_HINT.to_string()))
      .collect();
  }
  let blanks: usize = template.iter().map(|line| line.matches(BLANK_MARKER).count()).sum();
  if hints.len() < blanks {
    debug!(target: "pipeline", blanks, hints = hints.len(), "Backfilling placeholder hints");
    hints.resize(blanks, PLACEHOLDER_HINT.to_string());
  }

  obj.insert("template".into(), json!(template));
  obj.insert("hints".into(), json!(hints));

  if let Some(example) = obj.remove("example") {
    obj.insert("example".into(), normalize_example(example));
  }
}

/// Strings stay lines; segment objects (text / input / newline) are joined into
/// lines with a blank marker per input; a nested array is one line.
/// Returns the lines plus one optional hint per input segment.
fn linearize_template(elements: Vec<Value>) -> (Vec<String>, Vec<Option<String>>) {
  let mut lines: Vec<String> = Vec::new();
  let mut hints: Vec<Option<String>> = Vec::new();
  let mut current = String::new();

  for element in elements {
    match element {
      Value::String(s) => {
        flush_line(&mut current, &mut lines);
        lines.push(s);
      }
      Value::Array(segments) => {
        flush_line(&mut current, &mut lines);
        for segment in &segments {
          apply_segment(segment, &mut current, &mut lines, &mut hints);
        }
        flush_line(&mut current, &mut lines);
      }
      segment @ Value::Object(_) => apply_segment(&segment, &mut current, &mut lines, &mut hints),
      _ => {}
    }
  }
  flush_line(&mut current, &mut lines);

  (lines, hints)
}

fn flush_line(current: &mut String, lines: &mut Vec<String>) {
  if !current.trim().is_empty() {
    lines.push(current.trim_end().to_string());
  }
  current.clear();
}

fn apply_segment(segment: &Value, current: &mut String, lines: &mut Vec<String>, hints: &mut Vec<Option<String>>) {
  let Some(m) = segment.as_object() else {
    if let Some(s) = segment.as_str() {
      current.push_str(s);
    }
    return;
  };
  let kind = m.get("type").and_then(Value::as_str).map(str::to_lowercase).unwrap_or_else(|| {
    if m.contains_key("input") {
      "input".into()
    } else if m.contains_key("newline") {
      "newline".into()
    } else {
      "text".into()
    }
  });

  match kind.as_str() {
    "input" | "blank" | "gap" => {
      current.push_str(BLANK_MARKER);
      hints.push(m.get("hint").map(value_to_text).filter(|h| !h.trim().is_empty()));
    }
    "newline" | "br" | "line_break" => flush_line(current, lines),
    _ => {
      let text = m.get("value").or_else(|| m.get("text")).map(value_to_text).unwrap_or_default();
      current.push_str(&text);
    }
  }
}

fn normalize_example(example: Value) -> Value {
  let lines_of = |v: &Value| -> Vec<String> {
    match v {
      Value::Array(a) => a.iter().map(value_to_text).collect(),
      Value::String(s) => s.lines().map(str::to_string).collect(),
      _ => Vec::new(),
    }
  };

  match example {
    Value::Object(mut m) => {
      let lines = m.remove("lines").or_else(|| m.remove("text")).map(|v| lines_of(&v)).unwrap_or_default();
      m.insert("lines".into(), json!(lines));
      match m.get("button_label") {
        Some(Value::String(_)) => {}
        _ => {
          m.insert("button_label".into(), json!(DEFAULT_EXAMPLE_BUTTON));
        }
      }
      Value::Object(m)
    }
    other => {
      debug!(target: "pipeline", "Wrapped bare writing example");
      json!({ "lines": lines_of(&other), "button_label": DEFAULT_EXAMPLE_BUTTON })
    }
  }
}

// ---------- value coercion helpers ----------

fn take_array(m: &mut Map<String, Value>, key: &str) -> Vec<Value> {
  match m.remove(key) {
    Some(Value::Array(a)) => a,
    _ => Vec::new(),
  }
}

/// Best textual reading of any JSON value.
fn value_to_text(v: &Value) -> String {
  match v {
    Value::String(s) => s.clone(),
    Value::Number(n) => n.to_string(),
    Value::Bool(b) => b.to_string(),
    Value::Null => String::new(),
    Value::Array(a) => a.iter().map(value_to_text).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" "),
    Value::Object(o) => ["ru", "en", "text", "value"]
      .iter()
      .filter_map(|k| lookup_ci(o, k))
      .map(value_to_text)
      .find(|s| !s.is_empty())
      .unwrap_or_default(),
  }
}

fn coerce_string_fields(m: &mut Map<String, Value>, fields: &[&str]) {
  for field in fields {
    match m.get(*field) {
      None | Some(Value::String(_)) => {}
      Some(Value::Null) => {
        m.remove(*field);
      }
      Some(other) => {
        let text = value_to_text(other);
        m.insert((*field).to_string(), Value::String(text));
      }
    }
  }
}

fn lookup_ci<'a>(m: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
  m.get(key).or_else(|| m.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v))
}

/// Canonical `{"ru", "en"}` object from a bare string or a mixed-case object.
pub fn coerce_bilingual(v: &Value) -> Value {
  match v {
    Value::Object(o) => {
      let ru = lookup_ci(o, "ru").map(value_to_text).unwrap_or_default();
      let en = lookup_ci(o, "en").map(value_to_text).unwrap_or_default();
      if ru.is_empty() && en.is_empty() {
        return json!({ "ru": value_to_text(v), "en": "" });
      }
      json!({ "ru": ru, "en": en })
    }
    other => json!({ "ru": value_to_text(other), "en": "" }),
  }
}

fn coerce_bilingual_field(m: &mut Map<String, Value>, field: &str) {
  if let Some(v) = m.get(field) {
    let canonical = coerce_bilingual(v);
    m.insert(field.to_string(), canonical);
  }
}
