//! Supplemental vocabulary generation.
//!
//! When a lesson is a few cards short, ask the generator for a small batch of
//! extra cards instead of throwing the whole lesson away. A shortfall above 5
//! means the generation itself was bad and is escalated to a full retry.
//!
//! `settle_vocabulary` wraps top-up in the dedup pass: incomplete and
//! duplicate cards are dropped first, the list is topped back up, then
//! trimmed to the maximum size.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::Prompts;
use crate::domain::{Lesson, VocabularyCard, MAX_CARDS, MIN_CARDS};
use crate::error::LessonError;
use crate::repair::repair_and_parse;
use crate::service::GenerativeService;
use crate::util::{fill_template, trunc_for_log};
use crate::vocab::{dedup_cards, prune_incomplete, trim_excess};
use crate::words::{normalize_word, normalized_set};

pub const MAX_TOPUP_SHORTFALL: usize = 5;
pub const TOPUP_ATTEMPTS: usize = 4;
pub const MAX_BATCH: usize = 10;

/// Candidates to request for a given shortfall: generous for small gaps, capped at 10.
pub fn batch_size(shortfall: usize) -> usize {
  MAX_BATCH.min((shortfall + 2).max(shortfall * 3))
}

/// Add cards until the vocabulary task holds `target` cards. Returns how many were added.
///
/// Fails at once when more than 5 cards are missing below the minimum of 13;
/// a higher `target` only raises how many cards are requested.
#[instrument(level = "info", skip(service, prompts, lesson, used_words), fields(%topic, want = target, model = service.model_name()))]
pub async fn top_up(
  service: &dyn GenerativeService,
  prompts: &Prompts,
  lesson: &mut Lesson,
  used_words: &[String],
  topic: &str,
  target: usize,
) -> Result<usize, LessonError> {
  let vocab = lesson
    .vocabulary_mut()
    .ok_or_else(|| LessonError::TopUp("lesson has no vocabulary task".into()))?;
  let cards = &mut vocab.content.cards;

  if cards.len() >= target {
    return Ok(0);
  }
  // Escalation is measured against the minimum, not the restore target.
  let shortfall = MIN_CARDS.saturating_sub(cards.len());
  if shortfall > MAX_TOPUP_SHORTFALL {
    return Err(LessonError::TopUp(format!(
      "short by {shortfall} cards (have {}, need {MIN_CARDS}); more than {MAX_TOPUP_SHORTFALL} calls for a new lesson",
      cards.len()
    )));
  }

  let mut forbidden = normalized_set(used_words);
  forbidden.extend(cards.iter().map(|c| normalize_word(&c.word)).filter(|w| !w.is_empty()));

  let mut added = 0usize;
  let mut last_cause = String::from("no attempt made");
  for attempt in 1..=TOPUP_ATTEMPTS {
    let remaining = target.saturating_sub(cards.len());
    if remaining == 0 {
      break;
    }
    let count = batch_size(remaining);

    let mut forbidden_list: Vec<&str> = forbidden.iter().map(String::as_str).collect();
    forbidden_list.sort_unstable();
    let user = fill_template(
      &prompts.topup_user_template,
      &[
        ("count", &count.to_string()),
        ("shortfall", &remaining.to_string()),
        ("topic", topic),
        ("forbidden", &forbidden_list.join(", ")),
      ],
    );

    let raw = match service.complete(&prompts.topup_system, &user).await {
      Ok(raw) => raw,
      Err(e) => {
        warn!(target: "pipeline", attempt, error = %e, "Top-up call failed");
        last_cause = format!("generation failed: {e}");
        continue;
      }
    };
    let parsed = match repair_and_parse(&raw) {
      Ok(v) => v,
      Err(e) => {
        warn!(target: "pipeline", attempt, error = %e, preview = %trunc_for_log(&raw, 120), "Top-up batch unparseable");
        last_cause = e.to_string();
        continue;
      }
    };

    let candidates = extract_candidates(parsed);
    let offered = candidates.len();
    let mut batch_seen: HashSet<String> = HashSet::new();
    let mut accepted_now = 0usize;
    for candidate in candidates {
      if cards.len() >= target {
        break;
      }
      let Some(card) = accept_candidate(candidate, &forbidden, &mut batch_seen) else { continue };
      forbidden.insert(normalize_word(&card.word));
      cards.push(card);
      accepted_now += 1;
    }
    added += accepted_now;
    debug!(target: "pipeline", attempt, offered, accepted = accepted_now, have = cards.len(), want = target, "Top-up batch processed");

    if accepted_now == 0 {
      last_cause = format!("batch of {offered} candidates had no fresh complete cards");
    }
  }

  if cards.len() < target {
    return Err(LessonError::TopUp(format!(
      "still short by {} cards after {TOPUP_ATTEMPTS} attempts; last cause: {last_cause}",
      target - cards.len()
    )));
  }
  info!(target: "pipeline", added, total = cards.len(), "Vocabulary topped up");
  Ok(added)
}

/// Cards from `{"cards": [...]}`, `{"words": [...]}`, `{"content": {"cards": [...]}}` or a bare array.
fn extract_candidates(parsed: Value) -> Vec<Value> {
  match parsed {
    Value::Array(items) => items,
    Value::Object(mut m) => {
      for key in ["cards", "words"] {
        if let Some(Value::Array(items)) = m.remove(key) {
          return items;
        }
      }
      match m.remove("content") {
        Some(Value::Object(mut content)) => match content.remove("cards") {
          Some(Value::Array(items)) => items,
          _ => Vec::new(),
        },
        _ => Vec::new(),
      }
    }
    _ => Vec::new(),
  }
}

fn accept_candidate(candidate: Value, forbidden: &HashSet<String>, batch_seen: &mut HashSet<String>) -> Option<VocabularyCard> {
  let card: VocabularyCard = serde_json::from_value(candidate).ok()?;
  let norm = normalize_word(&card.word);
  if norm.is_empty() {
    return None;
  }
  if !batch_seen.insert(norm.clone()) {
    debug!(target: "pipeline", word = %card.word, "Rejecting in-batch duplicate");
    return None;
  }
  if forbidden.contains(&norm) {
    debug!(target: "pipeline", word = %card.word, "Rejecting forbidden word");
    return None;
  }
  if !card.is_complete() {
    debug!(target: "pipeline", word = %card.word, "Rejecting incomplete card");
    return None;
  }
  Some(card)
}

/// Dedup pass around top-up.
///
/// Incomplete and duplicate cards are dropped. If anything was dropped the
/// list is restored to its previous size (clamped to 13..=15), otherwise it is
/// only raised to the minimum. Finally the list is trimmed to 15.
#[instrument(level = "info", skip(service, prompts, lesson, used_words), fields(%topic))]
pub async fn settle_vocabulary(
  service: &dyn GenerativeService,
  prompts: &Prompts,
  lesson: &mut Lesson,
  used_words: &[String],
  topic: &str,
) -> Result<(), LessonError> {
  let (before, removed, now) = match lesson.vocabulary_mut() {
    Some(vocab) => {
      let cards = &mut vocab.content.cards;
      let before = cards.len();
      let removed = prune_incomplete(cards) + dedup_cards(cards);
      (before, removed, cards.len())
    }
    None => {
      warn!(target: "pipeline", "Lesson has no vocabulary task; nothing to settle");
      return Ok(());
    }
  };

  let target = if removed > 0 { before.clamp(MIN_CARDS, MAX_CARDS) } else { MIN_CARDS };
  if removed > 0 {
    info!(target: "pipeline", before, removed, now, want = target, "Dedup pass removed cards");
  }
  if now < target {
    top_up(service, prompts, lesson, used_words, topic, target).await?;
  }

  if let Some(vocab) = lesson.vocabulary_mut() {
    let cards = &mut vocab.content.cards;
    let late = dedup_cards(cards);
    if late > 0 {
      warn!(target: "pipeline", late, "Duplicates found after top-up");
    }
    trim_excess(cards, used_words);
  }
  Ok(())
}
