//! Domain models: the canonical lesson, its five task kinds, and their payloads.
//!
//! A lesson is exactly five tasks in fixed order:
//!   1 vocabulary, 2 rules, 3 listening-comprehension, 4 attention, 5 writing-optional.

use serde::{Deserialize, Serialize};

pub const TASK_COUNT: usize = 5;
pub const MIN_CARDS: usize = 13;
pub const MAX_CARDS: usize = 15;
pub const RULES_BLOCK_COUNT: usize = 6;
pub const QUIZ_ITEM_COUNT: usize = 3;
pub const OPTIONS_PER_ITEM: usize = 3;
/// Placeholder for one blank in a writing template line.
pub const BLANK_MARKER: &str = "___";
pub const DEFAULT_EXAMPLE_BUTTON: &str = "Show example";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
  #[serde(rename = "vocabulary")]
  Vocabulary,
  #[serde(rename = "rules")]
  Rules,
  #[serde(rename = "listening-comprehension")]
  Listening,
  #[serde(rename = "attention")]
  Attention,
  #[serde(rename = "writing-optional")]
  Writing,
}

impl TaskKind {
  pub const ORDER: [TaskKind; TASK_COUNT] = [
    TaskKind::Vocabulary,
    TaskKind::Rules,
    TaskKind::Listening,
    TaskKind::Attention,
    TaskKind::Writing,
  ];

  /// Canonical `type` label on the wire.
  pub fn label(self) -> &'static str {
    match self {
      TaskKind::Vocabulary => "vocabulary",
      TaskKind::Rules => "rules",
      TaskKind::Listening => "listening-comprehension",
      TaskKind::Attention => "attention",
      TaskKind::Writing => "writing-optional",
    }
  }

  /// Position → kind mapping (task_id is 1-based).
  pub fn for_task_id(task_id: u64) -> Option<TaskKind> {
    let idx = usize::try_from(task_id).ok()?.checked_sub(1)?;
    Self::ORDER.get(idx).copied()
  }

  /// Map canonical labels and the legacy aliases the generator still emits.
  pub fn from_label(label: &str) -> Option<TaskKind> {
    match label.trim().to_lowercase().as_str() {
      "vocabulary" | "vocab" | "words" => Some(TaskKind::Vocabulary),
      "rules" | "grammar" => Some(TaskKind::Rules),
      "listening-comprehension" | "listening" | "listening_comprehension" => Some(TaskKind::Listening),
      "attention" | "attention-check" | "attention_check" => Some(TaskKind::Attention),
      "writing-optional" | "writing" | "writing_optional" => Some(TaskKind::Writing),
      _ => None,
    }
  }
}

/// Text given in both interface languages.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bilingual {
  #[serde(default)] pub ru: String,
  #[serde(default)] pub en: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyCard {
  #[serde(default)] pub word: String,
  #[serde(default)] pub transcription: String,
  #[serde(default)] pub example: String,
  #[serde(default)] pub example_ru: String,
  #[serde(default)] pub example_en: String,
  #[serde(default)] pub translation_ru: String,
  #[serde(default)] pub translation_en: String,
}

impl VocabularyCard {
  pub const REQUIRED_FIELDS: [&'static str; 7] = [
    "word",
    "transcription",
    "example",
    "example_ru",
    "example_en",
    "translation_ru",
    "translation_en",
  ];

  pub fn is_complete(&self) -> bool {
    [
      &self.word,
      &self.transcription,
      &self.example,
      &self.example_ru,
      &self.example_en,
      &self.translation_ru,
      &self.translation_en,
    ]
    .iter()
    .all(|f| !f.trim().is_empty())
  }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
  #[serde(default)] pub label: Bilingual,
  #[serde(default)] pub is_correct: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenItem {
  #[serde(default)] pub audio_text: String,
  #[serde(default)] pub question: String,
  #[serde(default)] pub options: Vec<AnswerOption>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttentionItem {
  #[serde(default)] pub sentence: String,
  #[serde(default)] pub question: String,
  #[serde(default)] pub options: Vec<AnswerOption>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRow {
  #[serde(default)] pub left: String,
  #[serde(default)] pub right: String,
  #[serde(default)] pub note: Bilingual,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReinforcementTask {
  #[serde(default)] pub question: String,
  #[serde(default)] pub options: Vec<AnswerOption>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phrase {
  #[serde(default)] pub text: String,
  #[serde(default)] pub translation: Bilingual,
}

/// Variant-specific body of a rules block, tagged by `variant`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum BlockBody {
  Explanation {
    #[serde(default)] title: String,
    #[serde(default)] text: Bilingual,
    #[serde(default)] examples: Vec<String>,
    #[serde(default)] hints: Vec<Bilingual>,
  },
  Comparison {
    #[serde(default)] title: String,
    #[serde(default)] rows: Vec<ComparisonRow>,
  },
  Reinforcement {
    #[serde(default)] title: String,
    #[serde(default)] tasks: Vec<ReinforcementTask>,
  },
  SpeakAloud {
    #[serde(default)] title: String,
    #[serde(default)] phrases: Vec<Phrase>,
  },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockVariant {
  Explanation,
  Comparison,
  Reinforcement,
  SpeakAloud,
}

impl BlockVariant {
  pub fn label(self) -> &'static str {
    match self {
      BlockVariant::Explanation => "explanation",
      BlockVariant::Comparison => "comparison",
      BlockVariant::Reinforcement => "reinforcement",
      BlockVariant::SpeakAloud => "speak_aloud",
    }
  }
}

/// Fixed identifiers and required variants of the six rules blocks, in order.
pub const RULES_LAYOUT: [(&str, BlockVariant); RULES_BLOCK_COUNT] = [
  ("rule", BlockVariant::Explanation),
  ("examples", BlockVariant::Explanation),
  ("answers", BlockVariant::Explanation),
  ("comparison", BlockVariant::Comparison),
  ("reinforcement", BlockVariant::Reinforcement),
  ("speak_aloud", BlockVariant::SpeakAloud),
];

pub fn expected_variant(block_id: &str) -> Option<BlockVariant> {
  RULES_LAYOUT.iter().find(|(id, _)| *id == block_id).map(|(_, v)| *v)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesBlock {
  pub block_id: String,
  #[serde(flatten)]
  pub body: BlockBody,
}

impl RulesBlock {
  pub fn variant(&self) -> BlockVariant {
    match self.body {
      BlockBody::Explanation { .. } => BlockVariant::Explanation,
      BlockBody::Comparison { .. } => BlockVariant::Comparison,
      BlockBody::Reinforcement { .. } => BlockVariant::Reinforcement,
      BlockBody::SpeakAloud { .. } => BlockVariant::SpeakAloud,
    }
  }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyContent {
  #[serde(default)] pub cards: Vec<VocabularyCard>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyTask {
  pub task_id: u8,
  #[serde(default)] pub title: String,
  #[serde(default)] pub content: VocabularyContent,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesTask {
  pub task_id: u8,
  #[serde(default)] pub title: String,
  #[serde(default)] pub blocks: Vec<RulesBlock>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListeningTask {
  pub task_id: u8,
  #[serde(default)] pub title: String,
  #[serde(default)] pub items: Vec<ListenItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttentionTask {
  pub task_id: u8,
  #[serde(default)] pub title: String,
  #[serde(default)] pub items: Vec<AttentionItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
  #[serde(default)] pub text: Bilingual,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritingExample {
  #[serde(default)] pub lines: Vec<String>,
  #[serde(default)] pub button_label: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritingTask {
  pub task_id: u8,
  #[serde(default)] pub title: String,
  #[serde(default)] pub instruction: Instruction,
  #[serde(default)] pub template: Vec<String>,
  #[serde(default)] pub hints: Vec<String>,
  #[serde(default)] pub example: WritingExample,
}

impl WritingTask {
  pub fn blank_count(&self) -> usize {
    self.template.iter().map(|line| line.matches(BLANK_MARKER).count()).sum()
  }
}

/// One task of a lesson, tagged by its `type` label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Task {
  #[serde(rename = "vocabulary")]
  Vocabulary(VocabularyTask),
  #[serde(rename = "rules")]
  Rules(RulesTask),
  #[serde(rename = "listening-comprehension")]
  Listening(ListeningTask),
  #[serde(rename = "attention")]
  Attention(AttentionTask),
  #[serde(rename = "writing-optional")]
  Writing(WritingTask),
}

impl Task {
  pub fn kind(&self) -> TaskKind {
    match self {
      Task::Vocabulary(_) => TaskKind::Vocabulary,
      Task::Rules(_) => TaskKind::Rules,
      Task::Listening(_) => TaskKind::Listening,
      Task::Attention(_) => TaskKind::Attention,
      Task::Writing(_) => TaskKind::Writing,
    }
  }

  pub fn task_id(&self) -> u8 {
    match self {
      Task::Vocabulary(t) => t.task_id,
      Task::Rules(t) => t.task_id,
      Task::Listening(t) => t.task_id,
      Task::Attention(t) => t.task_id,
      Task::Writing(t) => t.task_id,
    }
  }

  /// A task of the given kind with no payload.
  pub fn empty(kind: TaskKind, task_id: u8) -> Task {
    match kind {
      TaskKind::Vocabulary => Task::Vocabulary(VocabularyTask { task_id, ..Default::default() }),
      TaskKind::Rules => Task::Rules(RulesTask { task_id, ..Default::default() }),
      TaskKind::Listening => Task::Listening(ListeningTask { task_id, ..Default::default() }),
      TaskKind::Attention => Task::Attention(AttentionTask { task_id, ..Default::default() }),
      TaskKind::Writing => Task::Writing(WritingTask { task_id, ..Default::default() }),
    }
  }

  /// True when the task carries any cards, blocks, items or template text.
  pub fn has_payload(&self) -> bool {
    match self {
      Task::Vocabulary(t) => !t.content.cards.is_empty(),
      Task::Rules(t) => !t.blocks.is_empty(),
      Task::Listening(t) => !t.items.is_empty(),
      Task::Attention(t) => !t.items.is_empty(),
      Task::Writing(t) => t.template.iter().any(|l| !l.trim().is_empty()),
    }
  }
}

/// Canonical lesson record handed to the caller for persistence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
  #[serde(default)]
  pub tasks: Vec<Task>,
}

impl Lesson {
  pub fn vocabulary(&self) -> Option<&VocabularyTask> {
    self.tasks.iter().find_map(|t| match t {
      Task::Vocabulary(v) => Some(v),
      _ => None,
    })
  }

  pub fn vocabulary_mut(&mut self) -> Option<&mut VocabularyTask> {
    self.tasks.iter_mut().find_map(|t| match t {
      Task::Vocabulary(v) => Some(v),
      _ => None,
    })
  }

  pub fn cards(&self) -> &[VocabularyCard] {
    self.vocabulary().map(|v| v.content.cards.as_slice()).unwrap_or(&[])
  }

  pub fn card_words(&self) -> Vec<String> {
    self.cards().iter().map(|c| c.word.clone()).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn task_kind_follows_position() {
    assert_eq!(TaskKind::for_task_id(1), Some(TaskKind::Vocabulary));
    assert_eq!(TaskKind::for_task_id(5), Some(TaskKind::Writing));
    assert_eq!(TaskKind::for_task_id(0), None);
    assert_eq!(TaskKind::for_task_id(6), None);
  }

  #[test]
  fn legacy_labels_alias_to_canonical() {
    assert_eq!(TaskKind::from_label("writing"), Some(TaskKind::Writing));
    assert_eq!(TaskKind::from_label("Listening"), Some(TaskKind::Listening));
    assert_eq!(TaskKind::from_label("podcast"), None);
  }

  #[test]
  fn rules_block_round_trips_through_variant_tag() {
    let v = json!({"block_id": "comparison", "variant": "comparison", "title": "ser vs estar", "rows": []});
    let block: RulesBlock = serde_json::from_value(v.clone()).unwrap();
    assert_eq!(block.variant(), BlockVariant::Comparison);
    assert_eq!(serde_json::to_value(&block).unwrap(), v);
  }

  #[test]
  fn writing_blanks_are_counted_across_lines() {
    let w = WritingTask {
      task_id: 5,
      template: vec!["Eu ___ no ___.".into(), "Ela ___.".into()],
      ..Default::default()
    };
    assert_eq!(w.blank_count(), 3);
  }

  #[test]
  fn card_completeness_requires_all_fields() {
    let mut card = VocabularyCard {
      word: "casa".into(),
      transcription: "ˈka.zɐ".into(),
      example: "A casa é grande.".into(),
      example_ru: "Дом большой.".into(),
      example_en: "The house is big.".into(),
      translation_ru: "дом".into(),
      translation_en: "house".into(),
    };
    assert!(card.is_complete());
    card.example_en = "  ".into();
    assert!(!card.is_complete());
  }
}
