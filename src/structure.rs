//! Structural checks on a normalized lesson.
//!
//! Only shell output aborts the attempt. Count mismatches are collected as
//! `LessonError::Cardinality` warnings and logged; the normalizer already
//! repaired what it could, and vocabulary size is enforced later.

use tracing::{instrument, warn};

use crate::domain::{
  Lesson, Task, TaskKind, MAX_CARDS, MIN_CARDS, OPTIONS_PER_ITEM, QUIZ_ITEM_COUNT, RULES_BLOCK_COUNT, RULES_LAYOUT,
  TASK_COUNT,
};
use crate::error::LessonError;

#[derive(Clone, Debug, Default)]
pub struct StructuralReport {
  pub warnings: Vec<LessonError>,
}

impl StructuralReport {
  fn warn(&mut self, msg: String) {
    warn!(target: "pipeline", warning = %msg, "Structural mismatch");
    self.warnings.push(LessonError::Cardinality(msg));
  }
}

#[instrument(level = "debug", skip_all, fields(tasks = lesson.tasks.len()))]
pub fn validate_structure(lesson: &Lesson) -> Result<StructuralReport, LessonError> {
  if lesson.tasks.is_empty() {
    return Err(LessonError::ShellOutput("response has no tasks array".into()));
  }
  check_shell(lesson)?;

  let mut report = StructuralReport::default();
  if lesson.tasks.len() != TASK_COUNT {
    report.warn(format!("expected {TASK_COUNT} tasks, got {}", lesson.tasks.len()));
  }
  for (pos, task) in lesson.tasks.iter().enumerate() {
    if let Some(expected) = TaskKind::ORDER.get(pos) {
      if task.kind() != *expected {
        report.warn(format!("task {} is {}, expected {}", pos + 1, task.kind().label(), expected.label()));
      }
    }
  }

  for task in &lesson.tasks {
    match task {
      Task::Vocabulary(v) => {
        let n = v.content.cards.len();
        if !(MIN_CARDS..=MAX_CARDS).contains(&n) {
          report.warn(format!("vocabulary has {n} cards, expected {MIN_CARDS}-{MAX_CARDS}"));
        }
      }
      Task::Rules(r) => {
        if r.blocks.len() != RULES_BLOCK_COUNT {
          report.warn(format!("rules has {} blocks, expected {RULES_BLOCK_COUNT}", r.blocks.len()));
        }
        for (block, (id, variant)) in r.blocks.iter().zip(RULES_LAYOUT.iter()) {
          if block.block_id != *id || block.variant() != *variant {
            report.warn(format!(
              "rules block '{}' ({}) where '{}' ({}) was expected",
              block.block_id,
              block.variant().label(),
              id,
              variant.label()
            ));
          }
        }
      }
      Task::Listening(l) => {
        let counts: Vec<usize> = l.items.iter().map(|i| i.options.len()).collect();
        check_quiz(&mut report, "listening", &counts);
      }
      Task::Attention(a) => {
        let counts: Vec<usize> = a.items.iter().map(|i| i.options.len()).collect();
        check_quiz(&mut report, "attention", &counts);
      }
      Task::Writing(w) => {
        let blanks = w.blank_count();
        if blanks != w.hints.len() {
          report.warn(format!("writing has {blanks} blanks but {} hints", w.hints.len()));
        }
      }
    }
  }

  Ok(report)
}

/// Shell output: every task is empty, or only the vocabulary list came back.
fn check_shell(lesson: &Lesson) -> Result<(), LessonError> {
  let empty: Vec<&Task> = lesson.tasks.iter().filter(|t| !t.has_payload()).collect();
  if empty.len() == lesson.tasks.len() {
    return Err(LessonError::ShellOutput(format!("all {} tasks are empty", lesson.tasks.len())));
  }

  let others: Vec<&Task> = lesson.tasks.iter().filter(|t| t.kind() != TaskKind::Vocabulary).collect();
  if !others.is_empty() && others.iter().all(|t| !t.has_payload()) {
    let labels: Vec<&str> = others.iter().map(|t| t.kind().label()).collect();
    return Err(LessonError::ShellOutput(format!(
      "{} of {} tasks are empty ({})",
      others.len(),
      lesson.tasks.len(),
      labels.join(", ")
    )));
  }
  Ok(())
}

fn check_quiz(report: &mut StructuralReport, name: &str, option_counts: &[usize]) {
  if option_counts.len() != QUIZ_ITEM_COUNT {
    report.warn(format!("{name} has {} items, expected {QUIZ_ITEM_COUNT}", option_counts.len()));
  }
  for (i, n) in option_counts.iter().enumerate() {
    if *n != OPTIONS_PER_ITEM {
      report.warn(format!("{name} item {} has {n} options, expected {OPTIONS_PER_ITEM}", i + 1));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::legacy::BlocksToCanonical;
  use crate::shape::fixtures::{lesson_json, words};
  use crate::shape::normalize_lesson;
  use serde_json::json;

  fn lesson(v: serde_json::Value) -> Lesson {
    normalize_lesson(v, &BlocksToCanonical)
  }

  #[test]
  fn complete_lesson_passes_without_warnings() {
    let report = validate_structure(&lesson(lesson_json(&words("w", 14)))).unwrap();
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
  }

  #[test]
  fn missing_tasks_is_shell_output() {
    assert!(matches!(validate_structure(&Lesson::default()), Err(LessonError::ShellOutput(_))));
  }

  #[test]
  fn all_empty_tasks_is_shell_output() {
    let v = json!({"tasks": [
      {"task_id": 1, "type": "vocabulary", "content": {"cards": []}},
      {"task_id": 2, "type": "rules", "blocks": []},
      {"task_id": 3, "type": "listening", "items": []},
      {"task_id": 4, "type": "attention", "items": []},
      {"task_id": 5, "type": "writing", "template": []}
    ]});
    let err = validate_structure(&lesson(v)).unwrap_err();
    assert!(matches!(err, LessonError::ShellOutput(ref m) if m.contains("all 5")));
  }

  #[test]
  fn vocabulary_only_lesson_is_shell_output() {
    let mut v = lesson_json(&words("w", 10));
    for i in 1..5 {
      let t = v["tasks"][i].as_object_mut().unwrap();
      t.retain(|k, _| k == "task_id" || k == "type");
    }
    let err = validate_structure(&lesson(v)).unwrap_err();
    assert!(matches!(err, LessonError::ShellOutput(ref m) if m.contains("4 of 5")));
  }

  #[test]
  fn short_counts_are_warnings_not_failures() {
    let mut v = lesson_json(&words("w", 11));
    v["tasks"][2]["items"].as_array_mut().unwrap().pop();
    v["tasks"][1]["blocks"].as_array_mut().unwrap().pop();
    let report = validate_structure(&lesson(v)).unwrap();
    let text: Vec<String> = report.warnings.iter().map(|w| w.to_string()).collect();
    assert!(text.iter().any(|w| w.contains("11 cards")));
    assert!(text.iter().any(|w| w.contains("5 blocks")));
    assert!(text.iter().any(|w| w.contains("listening has 2 items")));
    assert!(report.warnings.iter().all(|w| matches!(w, LessonError::Cardinality(_))));
  }
}
