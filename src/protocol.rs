//! Public protocol structs for HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Lesson;
use crate::pipeline::GeneratedLesson;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonIn {
    pub topic: String,
    #[serde(default)]
    pub methodology: Option<String>,
    /// Either a lesson object or its JSON text.
    #[serde(default)]
    pub example_lesson: Option<Value>,
    /// Overrides the stored used-word list for this topic.
    #[serde(default)]
    pub used_words: Option<Vec<String>>,
}

impl LessonIn {
    pub fn example_lesson_text(&self) -> Option<String> {
        match &self.example_lesson {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(v) => Some(v.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonOut {
    pub lesson: Lesson,
    pub new_words: Vec<String>,
    pub attempts: u8,
    pub run_id: String,
}

impl From<GeneratedLesson> for LessonOut {
    fn from(g: GeneratedLesson) -> Self {
        Self { lesson: g.lesson, new_words: g.new_words, attempts: g.attempts, run_id: g.run_id }
    }
}

#[derive(Debug, Deserialize)]
pub struct VocabularyQuery {
    pub topic: String,
}
#[derive(Serialize)]
pub struct VocabularyOut {
    pub topic: String,
    pub words: Vec<String>,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
