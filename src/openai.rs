//! Minimal OpenAI client for lesson generation.
//!
//! We only call chat.completions with a strict JSON-object response format.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::service::GenerativeService;
use crate::util::trunc_for_log;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model })
  }

  /// Generator for whole lessons.
  pub fn lesson_model(&self) -> OpenAIChat {
    OpenAIChat { api: self.clone(), model: self.strong_model.clone(), temperature: 0.7 }
  }

  /// Generator for supplemental vocabulary batches.
  pub fn topup_model(&self) -> OpenAIChat {
    OpenAIChat { api: self.clone(), model: self.fast_model.clone(), temperature: 0.5 }
  }

  /// JSON-object chat completion. Returns the raw message text; parsing and
  /// repair belong to the pipeline.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model, user_len = user.len()))]
  async fn chat_json_text(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: model.to_string(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      max_tokens: None,
    };

    let started = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "lesson-forge-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(format!("OpenAI HTTP {}: {}", status, trunc_for_log(&msg, 300)));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = first_choice_text(body).ok_or_else(|| "OpenAI returned no message content".to_string())?;
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, response_len = text.len(), "OpenAI completion received");
    Ok(text)
  }
}

/// One model bound to the shared client.
#[derive(Clone)]
pub struct OpenAIChat {
  api: OpenAI,
  model: String,
  temperature: f32,
}

#[async_trait]
impl GenerativeService for OpenAIChat {
  async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, String> {
    self.api.chat_json_text(&self.model, system_prompt, user_prompt, self.temperature).await
  }

  fn model_name(&self) -> &str {
    &self.model
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

fn first_choice_text(body: ChatCompletionResponse) -> Option<String> {
  body.choices.into_iter()
    .next()
    .and_then(|c| c.message.content)
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn request_asks_for_json_object() {
    let req = ChatCompletionRequest {
      model: "m".into(),
      messages: vec![ChatMessageReq { role: "user".into(), content: "hi".into() }],
      temperature: 0.5,
      response_format: Some(ResponseFormat { r#type: "json_object".into() }),
      max_tokens: None,
    };
    let v = serde_json::to_value(&req).unwrap();
    assert_eq!(v["response_format"]["type"], "json_object");
    assert!(v.get("max_tokens").is_none());
  }

  #[test]
  fn error_body_message_is_extracted() {
    let body = r#"{"error": {"message": "Rate limit reached", "type": "requests"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Rate limit reached"));
    assert_eq!(extract_openai_error("<html>bad gateway</html>"), None);
  }

  #[test]
  fn empty_choice_is_treated_as_missing() {
    let body: ChatCompletionResponse =
      serde_json::from_str(r#"{"choices": [{"message": {"content": "  "}}]}"#).unwrap();
    assert_eq!(first_choice_text(body), None);
    let body: ChatCompletionResponse =
      serde_json::from_str(r#"{"choices": [{"message": {"content": " {\"tasks\": []} "}}]}"#).unwrap();
    assert_eq!(first_choice_text(body).as_deref(), Some(r#"{"tasks": []}"#));
  }
}
