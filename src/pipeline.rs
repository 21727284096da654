//! Generate → repair → normalize → validate → settle vocabulary, with one retry.
//!
//! Attempt 0 runs with no failure context. If it fails, attempt 1 runs with a
//! feedback block derived from attempt 0's typed error. There is no third attempt.
//!
//! The used-word list is a snapshot taken by the caller before the run; the
//! pipeline never writes it back. Persisting the lesson and its new words is
//! the caller's job.

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Prompts;
use crate::domain::Lesson;
use crate::error::{LessonError, PipelineError};
use crate::legacy::LegacyTaskTransformer;
use crate::repair::repair_and_parse;
use crate::service::GenerativeService;
use crate::shape::normalize_lesson;
use crate::structure::validate_structure;
use crate::topup::settle_vocabulary;
use crate::util::{fill_template, word_list};
use crate::vocab::{check_freshness_and_uniqueness, FreshnessReport};

pub const MAX_ATTEMPTS: u8 = 2;

#[derive(Clone, Debug, Default)]
pub struct LessonRequest {
  pub topic: String,
  pub methodology: String,
  /// A previously accepted lesson, as JSON text, shown to the model as a format reference.
  pub example_lesson: Option<String>,
  /// Snapshot of words used by earlier lessons.
  pub used_words: Vec<String>,
}

/// One pass through the pipeline.
#[derive(Clone, Debug)]
pub struct GenerationAttempt {
  pub index: u8,
  pub previous_failure: Option<LessonError>,
  pub outcome: Option<Result<Lesson, LessonError>>,
}

impl GenerationAttempt {
  pub fn first() -> Self {
    Self { index: 0, previous_failure: None, outcome: None }
  }

  /// Store what this attempt produced.
  pub fn record(&mut self, result: Result<Lesson, LessonError>) {
    self.outcome = Some(result);
  }

  /// The attempt following a failed one, or `None` once the budget is spent.
  pub fn next(&self) -> Option<Self> {
    if self.index + 1 >= MAX_ATTEMPTS {
      return None;
    }
    match &self.outcome {
      Some(Err(e)) => Some(Self { index: self.index + 1, previous_failure: Some(e.clone()), outcome: None }),
      _ => None,
    }
  }
}

/// A lesson that passed every check, ready for the caller to persist.
#[derive(Clone, Debug)]
pub struct GeneratedLesson {
  pub lesson: Lesson,
  /// Card words absent from the used-word snapshot.
  pub new_words: Vec<String>,
  pub attempts: u8,
  pub run_id: String,
}

pub struct LessonPipeline<'a> {
  /// Generates full lessons.
  pub service: &'a dyn GenerativeService,
  /// Supplies top-up vocabulary batches. May be the same service.
  pub topup: &'a dyn GenerativeService,
  pub legacy: &'a dyn LegacyTaskTransformer,
  pub prompts: &'a Prompts,
}

impl<'a> LessonPipeline<'a> {
  pub async fn generate_valid_lesson(&self, request: &LessonRequest) -> Result<GeneratedLesson, PipelineError> {
    let run_id = Uuid::new_v4().to_string();
    let span = info_span!(
      target: "pipeline",
      "lesson_pipeline",
      %run_id,
      topic = %request.topic,
      used = request.used_words.len(),
      model = self.service.model_name()
    );
    self.run(request, run_id).instrument(span).await
  }

  async fn run(&self, request: &LessonRequest, run_id: String) -> Result<GeneratedLesson, PipelineError> {
    let mut attempt = GenerationAttempt::first();
    loop {
      let result = self.run_attempt(&attempt, request).await;
      match result {
        Ok((lesson, fresh)) => {
          info!(
            target: "pipeline",
            attempt = attempt.index,
            cards = lesson.cards().len(),
            new = fresh.new_words.len(),
            overlap = fresh.overlap.len(),
            "Lesson accepted"
          );
          attempt.record(Ok(lesson.clone()));
          return Ok(GeneratedLesson { lesson, new_words: fresh.new_words, attempts: attempt.index + 1, run_id });
        }
        Err(e) => {
          warn!(target: "pipeline", attempt = attempt.index, kind = e.kind(), error = %e, "Attempt failed");
          attempt.record(Err(e.clone()));
          match attempt.next() {
            Some(next) => attempt = next,
            None => return Err(PipelineError::Exhausted { attempts: attempt.index + 1, last: e }),
          }
        }
      }
    }
  }

  async fn run_attempt(
    &self,
    attempt: &GenerationAttempt,
    request: &LessonRequest,
  ) -> Result<(Lesson, FreshnessReport), LessonError> {
    let user = build_user_prompt(self.prompts, request, attempt);
    let raw = self
      .service
      .complete(&self.prompts.lesson_system, &user)
      .await
      .map_err(LessonError::Generation)?;

    let parsed = repair_and_parse(&raw)?;
    let mut lesson = normalize_lesson(parsed, self.legacy);
    let report = validate_structure(&lesson)?;
    if !report.warnings.is_empty() {
      info!(target: "pipeline", attempt = attempt.index, warnings = report.warnings.len(), "Structure accepted with warnings");
    }

    settle_vocabulary(self.topup, self.prompts, &mut lesson, &request.used_words, &request.topic).await?;
    let fresh = check_freshness_and_uniqueness(&lesson, &request.used_words)?;
    Ok((lesson, fresh))
  }
}

pub fn build_user_prompt(prompts: &Prompts, request: &LessonRequest, attempt: &GenerationAttempt) -> String {
  let example = request.example_lesson.as_deref().unwrap_or("(none)");
  let mut prompt = fill_template(
    &prompts.lesson_user_template,
    &[
      ("topic", &request.topic),
      ("methodology", &request.methodology),
      ("example_lesson", example),
      ("used_words", &word_list(&request.used_words)),
    ],
  );
  if let Some(failure) = &attempt.previous_failure {
    prompt.push_str(&feedback_block(failure));
  }
  prompt
}

/// Failure context appended to the retry prompt. Depends only on the error.
pub fn feedback_block(failure: &LessonError) -> String {
  let mut out = String::from("\n\n## PREVIOUS ATTEMPT FAILED\n");
  out.push_str(&format!("Reason: {failure}\n"));

  let specific = match failure {
    LessonError::ShellOutput(_) => {
      "Your previous answer contained empty tasks. Every one of the 5 tasks MUST be fully populated; \
       empty arrays, empty templates or placeholder tasks are rejected."
    }
    LessonError::Vocabulary(_) => {
      "Pick different vocabulary: respect the already-used word list and never repeat a word inside the lesson."
    }
    LessonError::TopUp(_) => "Provide between 13 and 15 complete vocabulary cards from the start.",
    LessonError::Parse(_) => "Return exactly one valid JSON object: no markdown fences, comments or trailing commas.",
    LessonError::Cardinality(_) => "Match the required number of blocks, items and options exactly.",
    LessonError::Generation(_) => "Answer with the complete lesson JSON.",
  };
  out.push_str(specific);
  out.push_str(
    "\n\nHard requirements (all mandatory):\n\
     - exactly 5 tasks: vocabulary, rules, listening-comprehension, attention, writing-optional\n\
     - 13 to 15 vocabulary cards, every card with all 7 fields non-empty\n\
     - at least 10 words not in the used list, at most 5 words from it\n\
     - no two cards with the same word (ignoring case and accents)\n\
     - rules: 6 blocks in the fixed order\n\
     - listening and attention: 3 items, 3 options each, exactly one correct\n\
     - writing: one hint per ___ blank\n",
  );
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::legacy::BlocksToCanonical;
  use crate::service::testing::ScriptedService;
  use crate::shape::fixtures::{card, lesson_json, words};
  use serde_json::json;

  fn request(used: Vec<String>) -> LessonRequest {
    LessonRequest {
      topic: "cidade".into(),
      methodology: "examples first".into(),
      example_lesson: None,
      used_words: used,
    }
  }

  fn shell_response() -> String {
    let cards: Vec<serde_json::Value> = words("w", 10).iter().map(|w| card(w)).collect();
    let body = json!({"tasks": [
      {"task_id": 1, "type": "vocabulary", "content": {"cards": cards}},
      {"task_id": 2, "type": "rules"},
      {"task_id": 3, "type": "listening"},
      {"task_id": 4, "type": "attention"},
      {"task_id": 5, "type": "writing"}
    ]});
    format!("```json\n{body}\n```")
  }

  async fn run(service: &ScriptedService, used: Vec<String>) -> Result<GeneratedLesson, PipelineError> {
    let prompts = Prompts::default();
    let pipeline = LessonPipeline { service, topup: service, legacy: &BlocksToCanonical, prompts: &prompts };
    pipeline.generate_valid_lesson(&request(used)).await
  }

  #[test]
  fn attempts_are_capped_at_two() {
    let mut first = GenerationAttempt::first();
    assert!(first.next().is_none(), "no retry without a failure");
    first.record(Err(LessonError::Parse("bad".into())));
    let mut second = first.next().expect("second attempt");
    assert_eq!(second.index, 1);
    assert_eq!(second.previous_failure, Some(LessonError::Parse("bad".into())));
    second.record(Err(LessonError::Parse("worse".into())));
    assert!(second.next().is_none());
  }

  #[test]
  fn successful_attempt_keeps_its_lesson_and_ends_the_loop() {
    let mut attempt = GenerationAttempt::first();
    assert!(attempt.outcome.is_none());
    let lesson = Lesson::default();
    attempt.record(Ok(lesson.clone()));
    assert_eq!(attempt.outcome, Some(Ok(lesson)));
    assert!(attempt.next().is_none());
  }

  #[test]
  fn first_prompt_has_no_feedback_and_retry_prompt_does() {
    let prompts = Prompts::default();
    let req = request(vec!["casa".into()]);
    let first = build_user_prompt(&prompts, &req, &GenerationAttempt::first());
    assert!(first.contains("cidade"));
    assert!(first.contains("casa"));
    assert!(!first.contains("PREVIOUS ATTEMPT FAILED"));

    let retry = GenerationAttempt {
      index: 1,
      previous_failure: Some(LessonError::ShellOutput("4 of 5 tasks are empty".into())),
      outcome: None,
    };
    let second = build_user_prompt(&prompts, &req, &retry);
    assert!(second.contains("PREVIOUS ATTEMPT FAILED"));
    assert!(second.contains("shell output: 4 of 5 tasks are empty"));
    assert!(second.contains("fully populated"));
    assert!(second.contains("Hard requirements"));
  }

  #[tokio::test]
  async fn shell_output_triggers_retry_and_rich_second_attempt_succeeds() {
    let good = lesson_json(&words("p", 14)).to_string();
    let service = ScriptedService::new([Ok(shell_response()), Ok(good)]);
    let out = run(&service, vec![]).await.unwrap();
    assert_eq!(out.attempts, 2);
    assert_eq!(out.lesson.tasks.len(), 5);
    assert_eq!(out.lesson.cards().len(), 14);
    assert_eq!(out.new_words.len(), 14);
    assert_eq!(service.calls(), 2, "shell output must not trigger top-up");
    assert!(service.user_prompt(1).contains("shell output"));
  }

  #[tokio::test]
  async fn short_vocabulary_is_topped_up_within_the_same_attempt() {
    let lesson = lesson_json(&words("p", 11)).to_string();
    let extra = json!({"cards": [card("x1"), card("x2"), card("x3")]}).to_string();
    let service = ScriptedService::new([Ok(lesson), Ok(extra)]);
    let out = run(&service, vec![]).await.unwrap();
    assert_eq!(out.attempts, 1);
    assert_eq!(out.lesson.cards().len(), 13);
    assert_eq!(service.calls(), 2);
  }

  #[tokio::test]
  async fn final_error_wraps_the_second_failure_only() {
    let used: Vec<String> = words("p", 8);
    let stale = lesson_json(&words("p", 13)).to_string();
    let service = ScriptedService::new([Ok("garbage".to_string()), Ok(stale)]);
    let err = run(&service, used).await.unwrap_err();
    let PipelineError::Exhausted { attempts, last } = &err;
    assert_eq!(*attempts, 2);
    assert!(matches!(last, LessonError::Vocabulary(m) if m.contains("overlap=8")));
    assert!(!err.to_string().contains("parse error"));
  }

  #[tokio::test]
  async fn generator_outage_on_both_attempts_is_reported() {
    let service = ScriptedService::new([Err("HTTP 503".to_string()), Err("HTTP 503".to_string())]);
    let err = run(&service, vec![]).await.unwrap_err();
    assert_eq!(err.last(), &LessonError::Generation("HTTP 503".into()));
  }

  #[tokio::test]
  async fn accepted_lesson_partitions_words_against_snapshot() {
    let used = vec!["p1".to_string(), "P2".to_string(), "outra".to_string()];
    let service = ScriptedService::new([Ok(lesson_json(&words("p", 15)).to_string())]);
    let out = run(&service, used).await.unwrap();
    assert_eq!(out.lesson.cards().len(), 15);
    assert_eq!(out.new_words.len(), 13);
    assert!(!out.new_words.contains(&"p1".to_string()));
  }
}
