//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{State, Query}, http::StatusCode, Json, response::{IntoResponse, Response}};
use tracing::{info, instrument};

use crate::error::ServiceError;
use crate::logic::generate_lesson;
use crate::protocol::*;
use crate::service::UsedVocabularySource;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(topic = %body.topic))]
pub async fn http_post_lesson(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LessonIn>,
) -> Response {
  match generate_lesson(&state, body).await {
    Ok(out) => Json(out).into_response(),
    Err(e) => error_response(e),
  }
}

#[instrument(level = "info", skip(state), fields(topic = %q.topic))]
pub async fn http_get_vocabulary(
  State(state): State<Arc<AppState>>,
  Query(q): Query<VocabularyQuery>,
) -> impl IntoResponse {
  let words = state.vocabulary.read_used_words(&q.topic).await;
  info!(target: "lesson_forge", topic = %q.topic, count = words.len(), "HTTP vocabulary served");
  Json(VocabularyOut { topic: q.topic, words })
}

fn error_response(e: ServiceError) -> Response {
  let status = match &e {
    ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
    ServiceError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    ServiceError::Pipeline(_) => StatusCode::BAD_GATEWAY,
  };
  (status, Json(ErrorOut { error: e.to_string() })).into_response()
}
