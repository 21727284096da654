//! Vocabulary invariants: card count, in-lesson uniqueness, and freshness
//! against every word used by previously accepted lessons.
//!
//! Freshness: at least 10 words the learner has never seen, at most 5 repeats.

use std::collections::HashSet;

use tracing::{debug, instrument, warn};

use crate::domain::{Lesson, VocabularyCard, MAX_CARDS, MIN_CARDS};
use crate::error::LessonError;
use crate::words::{normalize_word, normalized_set};

pub const MIN_NEW_WORDS: usize = 10;
pub const MAX_OVERLAP: usize = 5;

/// How the lesson's words split against the used-word snapshot.
/// `new_words` and `overlap` partition the card words exactly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FreshnessReport {
  pub new_words: Vec<String>,
  pub overlap: Vec<String>,
}

#[instrument(level = "debug", skip_all, fields(used = used_words.len()))]
pub fn check_freshness_and_uniqueness(lesson: &Lesson, used_words: &[String]) -> Result<FreshnessReport, LessonError> {
  let cards = lesson.cards();
  if cards.len() < MIN_CARDS {
    return Err(LessonError::Vocabulary(format!(
      "only {} vocabulary cards, need at least {MIN_CARDS}",
      cards.len()
    )));
  }
  if let Some(pos) = cards.iter().position(|c| !c.is_complete()) {
    return Err(LessonError::Vocabulary(format!(
      "card {} ('{}') has empty required fields",
      pos + 1,
      cards[pos].word
    )));
  }

  let mut seen: HashSet<String> = HashSet::new();
  for card in cards {
    let norm = normalize_word(&card.word);
    if !seen.insert(norm.clone()) {
      return Err(LessonError::Vocabulary(format!("internal duplicate: '{}' ({norm})", card.word)));
    }
  }

  let used = normalized_set(used_words);
  let (overlap, new_words): (Vec<&VocabularyCard>, Vec<&VocabularyCard>) =
    cards.iter().partition(|c| used.contains(&normalize_word(&c.word)));
  let report = FreshnessReport {
    new_words: new_words.iter().map(|c| c.word.clone()).collect(),
    overlap: overlap.iter().map(|c| c.word.clone()).collect(),
  };

  debug!(target: "pipeline", new = report.new_words.len(), overlap = report.overlap.len(), "Vocabulary freshness");
  if report.new_words.len() < MIN_NEW_WORDS || report.overlap.len() > MAX_OVERLAP {
    return Err(LessonError::Vocabulary(format!(
      "freshness violation: new={} (need >= {MIN_NEW_WORDS}), overlap={} (max {MAX_OVERLAP}); already used: {}",
      report.new_words.len(),
      report.overlap.len(),
      report.overlap.join(", ")
    )));
  }
  Ok(report)
}

/// Keep the first card per normalized word. Returns how many were removed.
pub fn dedup_cards(cards: &mut Vec<VocabularyCard>) -> usize {
  let before = cards.len();
  let mut seen: HashSet<String> = HashSet::new();
  cards.retain(|c| {
    let keep = seen.insert(normalize_word(&c.word));
    if !keep {
      debug!(target: "pipeline", word = %c.word, "Dropping duplicate card");
    }
    keep
  });
  before - cards.len()
}

/// Drop cards with any empty required field. Returns how many were removed.
pub fn prune_incomplete(cards: &mut Vec<VocabularyCard>) -> usize {
  let before = cards.len();
  cards.retain(|c| {
    let keep = c.is_complete() && !normalize_word(&c.word).is_empty();
    if !keep {
      warn!(target: "pipeline", word = %c.word, "Dropping incomplete card");
    }
    keep
  });
  before - cards.len()
}

/// Cut the list down to the maximum size, dropping already-used words first,
/// then from the end. Returns the removed words.
pub fn trim_excess(cards: &mut Vec<VocabularyCard>, used_words: &[String]) -> Vec<String> {
  let used = normalized_set(used_words);
  let mut removed = Vec::new();
  while cards.len() > MAX_CARDS {
    let idx = cards
      .iter()
      .rposition(|c| used.contains(&normalize_word(&c.word)))
      .unwrap_or(cards.len() - 1);
    removed.push(cards.remove(idx).word);
  }
  if !removed.is_empty() {
    debug!(target: "pipeline", removed = ?removed, "Trimmed vocabulary to {MAX_CARDS} cards");
  }
  removed
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Task, VocabularyContent, VocabularyTask};

  fn card(word: &str) -> VocabularyCard {
    VocabularyCard {
      word: word.into(),
      transcription: "t".into(),
      example: "e".into(),
      example_ru: "р".into(),
      example_en: "e".into(),
      translation_ru: "п".into(),
      translation_en: "tr".into(),
    }
  }

  fn lesson_with(words: &[&str]) -> Lesson {
    Lesson {
      tasks: vec![Task::Vocabulary(VocabularyTask {
        task_id: 1,
        title: String::new(),
        content: VocabularyContent { cards: words.iter().map(|w| card(w)).collect() },
      })],
    }
  }

  const THIRTEEN: [&str; 13] = [
    "casa", "rua", "livro", "mesa", "porta", "janela", "carro", "praia", "sol", "lua", "mar", "rio", "flor",
  ];

  fn strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
  }

  #[test]
  fn fresh_lesson_passes_and_partitions_words() {
    let used = strings(&["casa", "RUA", "Livro"]);
    let report = check_freshness_and_uniqueness(&lesson_with(&THIRTEEN), &used).unwrap();
    assert_eq!(report.overlap, strings(&["casa", "rua", "livro"]));
    assert_eq!(report.new_words.len(), 10);
    assert_eq!(report.new_words.len() + report.overlap.len(), THIRTEEN.len());
    assert!(report.new_words.iter().all(|w| !report.overlap.contains(w)));
  }

  #[test]
  fn eight_used_words_fail_on_overlap() {
    let used = strings(&THIRTEEN[..8]);
    let err = check_freshness_and_uniqueness(&lesson_with(&THIRTEEN), &used).unwrap_err();
    match err {
      LessonError::Vocabulary(msg) => {
        assert!(msg.contains("overlap=8"), "{msg}");
        assert!(msg.contains("new=5"), "{msg}");
      }
      other => panic!("unexpected error {other:?}"),
    }
  }

  #[test]
  fn six_overlapping_words_fail_even_with_enough_new() {
    let mut words: Vec<&str> = THIRTEEN.to_vec();
    words.extend(["nuvem", "chuva", "vento"]);
    let used = strings(&THIRTEEN[..6]);
    let err = check_freshness_and_uniqueness(&lesson_with(&words), &used).unwrap_err();
    assert!(matches!(err, LessonError::Vocabulary(ref m) if m.contains("new=10") && m.contains("overlap=6")));
  }

  #[test]
  fn fewer_than_thirteen_cards_fail() {
    let err = check_freshness_and_uniqueness(&lesson_with(&THIRTEEN[..12]), &[]).unwrap_err();
    assert!(matches!(err, LessonError::Vocabulary(ref m) if m.contains("only 12")));
  }

  #[test]
  fn internal_duplicates_fail() {
    let mut words: Vec<&str> = THIRTEEN.to_vec();
    words.push("Casa!");
    let err = check_freshness_and_uniqueness(&lesson_with(&words), &[]).unwrap_err();
    assert!(matches!(err, LessonError::Vocabulary(ref m) if m.contains("internal duplicate")));
  }

  #[test]
  fn dedup_collapses_case_and_accent_variants_and_is_idempotent() {
    let mut cards: Vec<VocabularyCard> = ["Está", "está", "casa", "CASA", "rua"].iter().map(|w| card(w)).collect();
    assert_eq!(dedup_cards(&mut cards), 2);
    let words: Vec<&str> = cards.iter().map(|c| c.word.as_str()).collect();
    assert_eq!(words, vec!["Está", "casa", "rua"]);
    let snapshot = cards.clone();
    assert_eq!(dedup_cards(&mut cards), 0);
    assert_eq!(cards, snapshot);
  }

  #[test]
  fn prune_drops_cards_with_missing_fields() {
    let mut broken = card("mar");
    broken.translation_en = String::new();
    let mut cards = vec![card("sol"), broken, card("?!")];
    assert_eq!(prune_incomplete(&mut cards), 2);
    assert_eq!(cards.len(), 1);
  }

  #[test]
  fn trim_prefers_dropping_used_words() {
    let mut words: Vec<&str> = THIRTEEN.to_vec();
    words.extend(["nuvem", "chuva", "vento", "neve"]);
    let mut cards: Vec<VocabularyCard> = words.iter().map(|w| card(w)).collect();
    let removed = trim_excess(&mut cards, &strings(&["rua"]));
    assert_eq!(cards.len(), MAX_CARDS);
    assert_eq!(removed, strings(&["rua", "neve"]));
  }
}
