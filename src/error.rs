//! Error taxonomy for the lesson pipeline.
//!
//! Every stage returns a `LessonError`. Attempt 0 turns it into feedback for
//! attempt 1; attempt 1 wraps it into `PipelineError::Exhausted`.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LessonError {
  /// No JSON structure could be recovered from the model response.
  #[error("parse error: {0}")]
  Parse(String),

  /// Tasks are present but carry no payload.
  #[error("shell output: {0}")]
  ShellOutput(String),

  /// Vocabulary uniqueness or freshness violation.
  #[error("vocabulary error: {0}")]
  Vocabulary(String),

  /// Supplemental vocabulary could not reach the minimum card count.
  #[error("top-up error: {0}")]
  TopUp(String),

  /// Wrong block/item counts. Normally only logged.
  #[error("cardinality error: {0}")]
  Cardinality(String),

  /// The generative service call itself failed.
  #[error("generation failed: {0}")]
  Generation(String),
}

impl LessonError {
  /// Short machine-friendly label used in logs and feedback text.
  pub fn kind(&self) -> &'static str {
    match self {
      LessonError::Parse(_) => "parse",
      LessonError::ShellOutput(_) => "shell_output",
      LessonError::Vocabulary(_) => "vocabulary",
      LessonError::TopUp(_) => "top_up",
      LessonError::Cardinality(_) => "cardinality",
      LessonError::Generation(_) => "generation",
    }
  }
}

/// Final failure surfaced to the caller once every attempt is spent.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
  #[error("lesson generation failed after {attempts} attempts: {last}")]
  Exhausted { attempts: u8, last: LessonError },
}

impl PipelineError {
  pub fn last(&self) -> &LessonError {
    match self {
      PipelineError::Exhausted { last, .. } => last,
    }
  }
}

/// Failures surfaced by the HTTP-facing lesson service.
#[derive(Debug, Error)]
pub enum ServiceError {
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("lesson generation is not configured (OPENAI_API_KEY missing)")]
  Unavailable,

  #[error(transparent)]
  Pipeline(#[from] PipelineError),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn exhausted_message_carries_last_cause() {
    let err = PipelineError::Exhausted {
      attempts: 2,
      last: LessonError::Vocabulary("overlap=8 > 5".into()),
    };
    let msg = err.to_string();
    assert!(msg.contains("after 2 attempts"));
    assert!(msg.contains("overlap=8 > 5"));
    assert_eq!(err.last().kind(), "vocabulary");
  }
}
