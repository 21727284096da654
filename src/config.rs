//! Loading lesson configuration (prompts + default methodology) from TOML.
//!
//! See `LessonConfig` and `Prompts` for expected schema. Every field is
//! optional; anything missing falls back to the built-in defaults.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct LessonConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub lesson: LessonSettings,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LessonSettings {
  /// Methodology text used when a request does not bring its own.
  pub default_methodology: String,
}

impl Default for LessonSettings {
  fn default() -> Self {
    Self {
      default_methodology: "Communicative approach: every new word appears in a short, natural sentence; \
        grammar is introduced through examples first and a rule second; each task reuses the lesson's vocabulary."
        .into(),
    }
  }
}

/// Prompts used by the lesson pipeline.
///
/// Placeholders:
///   lesson_user_template : {topic} {methodology} {example_lesson} {used_words}
///   topup_user_template  : {count} {shortfall} {topic} {forbidden}
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub lesson_system: String,
  pub lesson_user_template: String,
  pub topup_system: String,
  pub topup_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      lesson_system: "You are a language lesson generator. Respond ONLY with strict JSON, no markdown, no prose.".into(),
      lesson_user_template: r#"Create one lesson on the topic "{topic}".

Methodology:
{methodology}

Return JSON {"tasks": [...]} with exactly 5 tasks in this order:
1. {"task_id": 1, "type": "vocabulary", "title": str, "content": {"cards": [13-15 cards]}}
   card = {"word", "transcription", "example", "example_ru", "example_en", "translation_ru", "translation_en"} (all non-empty strings)
2. {"task_id": 2, "type": "rules", "title": str, "blocks": [6 blocks]}
   block_id/variant in order: rule/explanation, examples/explanation, answers/explanation,
   comparison/comparison, reinforcement/reinforcement, speak_aloud/speak_aloud
   explanation = {"title", "text": {"ru", "en"}, "examples": [str], "hints": [{"ru", "en"}]}
   comparison = {"title", "rows": [{"left", "right", "note": {"ru", "en"}}]}
   reinforcement = {"title", "tasks": [up to 2 x {"question", "options": [{"label": {"ru", "en"}, "is_correct": bool}]}]}
   speak_aloud = {"title", "phrases": [{"text", "translation": {"ru", "en"}}]}
3. {"task_id": 3, "type": "listening-comprehension", "title": str, "items": [3 x {"audio_text", "question", "options": [3 options, exactly one is_correct]}]}
4. {"task_id": 4, "type": "attention", "title": str, "items": [3 x {"sentence", "question", "options": [3 options, exactly one is_correct]}]}
5. {"task_id": 5, "type": "writing-optional", "title": str, "instruction": {"text": {"ru", "en"}},
   "template": [lines with ___ for each blank], "hints": [one per blank], "example": {"lines": [str], "button_label": str}}

Vocabulary rules:
- At least 10 words must be new: NOT in the list of already used words below.
- At most 5 words may repeat from that list.
- No two cards may share the same word (ignoring case and accents).

Already used words:
{used_words}

Example of a previous lesson (format reference only, do not copy its words):
{example_lesson}"#
        .into(),
      topup_system: "You supply extra vocabulary cards for a language lesson. Respond ONLY with strict JSON.".into(),
      topup_user_template: r#"The lesson on "{topic}" is short by {shortfall} vocabulary cards.
Return JSON {"cards": [...]} with {count} candidate cards.
card = {"word", "transcription", "example", "example_ru", "example_en", "translation_ru", "translation_en"} (all non-empty strings)
Do NOT use any of these words (ignoring case and accents):
{forbidden}"#
        .into(),
    }
  }
}

/// Attempt to load `LessonConfig` from LESSON_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_lesson_config_from_env() -> Option<LessonConfig> {
  let path = std::env::var("LESSON_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<LessonConfig>(&s) {
      Ok(cfg) => {
        info!(target: "lesson_forge", %path, "Loaded lesson config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "lesson_forge", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "lesson_forge", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_defaults() {
    let cfg: LessonConfig = toml::from_str(
      r#"
        [prompts]
        topup_system = "custom"
      "#,
    )
    .unwrap();
    assert_eq!(cfg.prompts.topup_system, "custom");
    assert_eq!(cfg.prompts.lesson_system, Prompts::default().lesson_system);
    assert!(!cfg.lesson.default_methodology.is_empty());
  }

  #[test]
  fn default_templates_carry_their_placeholders() {
    let p = Prompts::default();
    for key in ["{topic}", "{methodology}", "{example_lesson}", "{used_words}"] {
      assert!(p.lesson_user_template.contains(key), "missing {key}");
    }
    for key in ["{count}", "{shortfall}", "{topic}", "{forbidden}"] {
      assert!(p.topup_user_template.contains(key), "missing {key}");
    }
  }
}
