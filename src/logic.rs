//! Core behaviors behind the HTTP handlers.
//!
//! This includes:
//!   - Running the lesson pipeline against a point-in-time used-word snapshot
//!   - Recording the accepted lesson's vocabulary afterwards

use tracing::{error, info, instrument};

use crate::error::ServiceError;
use crate::pipeline::{LessonPipeline, LessonRequest};
use crate::protocol::{LessonIn, LessonOut};
use crate::service::UsedVocabularySource;
use crate::state::AppState;

#[instrument(level = "info", skip(state, body), fields(topic = %body.topic))]
pub async fn generate_lesson(state: &AppState, body: LessonIn) -> Result<LessonOut, ServiceError> {
  let topic = body.topic.trim().to_string();
  if topic.is_empty() {
    return Err(ServiceError::InvalidRequest("topic must not be empty".into()));
  }
  let generators = state.generators.as_ref().ok_or(ServiceError::Unavailable)?;

  // One snapshot for the whole run; concurrent runs may still overlap.
  let used_words = match &body.used_words {
    Some(words) => words.clone(),
    None => state.vocabulary.read_used_words(&topic).await,
  };
  let request = LessonRequest {
    topic: topic.clone(),
    methodology: body
      .methodology
      .clone()
      .filter(|m| !m.trim().is_empty())
      .unwrap_or_else(|| state.settings.default_methodology.clone()),
    example_lesson: body.example_lesson_text(),
    used_words,
  };

  let pipeline = LessonPipeline {
    service: generators.lesson.as_ref(),
    topup: generators.topup.as_ref(),
    legacy: &state.legacy,
    prompts: &state.prompts,
  };
  match pipeline.generate_valid_lesson(&request).await {
    Ok(generated) => {
      state.vocabulary.append_words(&topic, &generated.lesson.card_words()).await;
      info!(target: "lesson_forge", %topic, run_id = %generated.run_id, attempts = generated.attempts, new_words = generated.new_words.len(), "Lesson generated");
      Ok(generated.into())
    }
    Err(e) => {
      error!(target: "lesson_forge", %topic, error = %e, "Lesson generation failed");
      Err(e.into())
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::config::{LessonSettings, Prompts};
  use crate::service::testing::ScriptedService;
  use crate::service::GenerativeService;
  use crate::shape::fixtures::{lesson_json, words};
  use crate::state::Generators;

  fn state_with(service: Arc<ScriptedService>) -> AppState {
    let generators = Generators {
      lesson: service.clone() as Arc<dyn GenerativeService>,
      topup: service as Arc<dyn GenerativeService>,
    };
    AppState::with_parts(Prompts::default(), LessonSettings::default(), Some(generators))
  }

  fn body(topic: &str) -> LessonIn {
    LessonIn { topic: topic.into(), methodology: None, example_lesson: None, used_words: None }
  }

  #[tokio::test]
  async fn accepted_lesson_vocabulary_is_recorded() {
    let service = Arc::new(ScriptedService::new([Ok(lesson_json(&words("a", 13)).to_string())]));
    let state = state_with(service.clone());
    let out = generate_lesson(&state, body("cidade")).await.unwrap();
    assert_eq!(out.attempts, 1);
    assert_eq!(out.new_words.len(), 13);
    assert_eq!(state.vocabulary.read_used_words("cidade").await.len(), 13);
    assert!(service.user_prompt(0).contains(&LessonSettings::default().default_methodology));
  }

  #[tokio::test]
  async fn second_lesson_sees_first_lessons_words() {
    let service = Arc::new(ScriptedService::new([
      Ok(lesson_json(&words("a", 13)).to_string()),
      Ok(lesson_json(&words("b", 13)).to_string()),
    ]));
    let state = state_with(service.clone());
    generate_lesson(&state, body("cidade")).await.unwrap();
    generate_lesson(&state, body("cidade")).await.unwrap();
    assert!(service.user_prompt(1).contains("a13"));
    assert_eq!(state.vocabulary.read_used_words("cidade").await.len(), 26);
  }

  #[tokio::test]
  async fn failed_generation_records_nothing() {
    let service = Arc::new(ScriptedService::new([Ok("nope".to_string()), Ok("still nope".to_string())]));
    let state = state_with(service);
    let err = generate_lesson(&state, body("cidade")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Pipeline(_)));
    assert!(state.vocabulary.read_used_words("cidade").await.is_empty());
  }

  #[tokio::test]
  async fn missing_generator_and_blank_topic_are_rejected() {
    let state = AppState::with_parts(Prompts::default(), LessonSettings::default(), None);
    assert!(matches!(generate_lesson(&state, body("cidade")).await, Err(ServiceError::Unavailable)));
    assert!(matches!(generate_lesson(&state, body("  ")).await, Err(ServiceError::InvalidRequest(_))));
  }
}
