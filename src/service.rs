//! Seams to the collaborators the lesson pipeline consumes.
//!
//! - `GenerativeService`: the text generator (OpenAI in production, scripted fakes in tests).
//! - `UsedVocabularySource`: the store of words already taught per topic.

use async_trait::async_trait;

#[async_trait]
pub trait GenerativeService: Send + Sync {
  /// One system + user prompt round trip, returning the raw model text.
  async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, String>;

  /// Model name for logging.
  fn model_name(&self) -> &str;
}

#[async_trait]
pub trait UsedVocabularySource: Send + Sync {
  /// Point-in-time snapshot of every word used by accepted lessons for this topic.
  async fn read_used_words(&self, topic: &str) -> Vec<String>;

  /// Record the vocabulary of a newly accepted lesson.
  async fn append_words(&self, topic: &str, words: &[String]);
}

#[cfg(test)]
pub(crate) mod testing {
  use std::collections::VecDeque;
  use std::sync::Mutex;

  use async_trait::async_trait;

  use super::GenerativeService;

  /// Replays canned responses in order and records every prompt it was sent.
  #[derive(Default)]
  pub struct ScriptedService {
    responses: Mutex<VecDeque<Result<String, String>>>,
    pub prompts: Mutex<Vec<(String, String)>>,
  }

  impl ScriptedService {
    pub fn new<I>(responses: I) -> Self
    where
      I: IntoIterator<Item = Result<String, String>>,
    {
      Self {
        responses: Mutex::new(responses.into_iter().collect()),
        prompts: Mutex::new(Vec::new()),
      }
    }

    pub fn calls(&self) -> usize {
      self.prompts.lock().unwrap().len()
    }

    pub fn user_prompt(&self, i: usize) -> String {
      self.prompts.lock().unwrap()[i].1.clone()
    }
  }

  #[async_trait]
  impl GenerativeService for ScriptedService {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, String> {
      self.prompts.lock().unwrap().push((system_prompt.to_string(), user_prompt.to_string()));
      self
        .responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err("script exhausted".into()))
    }

    fn model_name(&self) -> &str {
      "scripted"
    }
  }
}
