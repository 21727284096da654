//! Word normalization for "sameness" comparisons.
//!
//! Lower-cases, decomposes (NFD) and drops combining marks, then collapses
//! every run of non-alphanumeric characters into one space.
//!
//! Example:
//!   "  Hôjè!! " -> "hoje"
//!   "bom-dia"   -> "bom dia"

use std::collections::HashSet;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub fn normalize_word(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut pending_space = false;

  for ch in s.nfd().flat_map(char::to_lowercase).filter(|c| !is_combining_mark(*c)) {
    if ch.is_alphanumeric() {
      if pending_space && !out.is_empty() {
        out.push(' ');
      }
      pending_space = false;
      out.push(ch);
    } else {
      pending_space = true;
    }
  }

  out
}

/// Normalize a list of words into a set, skipping entries that normalize to "".
pub fn normalized_set<'a, I>(words: I) -> HashSet<String>
where
  I: IntoIterator<Item = &'a String>,
{
  words
    .into_iter()
    .map(|w| normalize_word(w))
    .filter(|w| !w.is_empty())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn case_and_diacritic_variants_match() {
    assert_eq!(normalize_word("Hoje"), "hoje");
    assert_eq!(normalize_word("hoje"), "hoje");
    assert_eq!(normalize_word("hôjè"), "hoje");
    assert_eq!(normalize_word("Está"), normalize_word("está"));
  }

  #[test]
  fn punctuation_runs_collapse_to_single_space() {
    assert_eq!(normalize_word("  bom -- dia!! "), "bom dia");
    assert_eq!(normalize_word("...obrigado"), "obrigado");
    assert_eq!(normalize_word("o'clock"), "o clock");
  }

  #[test]
  fn empty_and_symbol_only_inputs_yield_empty() {
    assert_eq!(normalize_word(""), "");
    assert_eq!(normalize_word("  ?!  "), "");
  }

  #[test]
  fn normalization_is_idempotent() {
    for s in ["Hôjè", "São Paulo", "  Ç-a   va ", "pão", "ÁGUA", "12 horas"] {
      let once = normalize_word(s);
      assert_eq!(normalize_word(&once), once, "not idempotent for {s:?}");
    }
  }

  #[test]
  fn normalized_set_skips_blank_words() {
    let words = vec!["Casa".to_string(), "casa".to_string(), "  ".to_string()];
    let set = normalized_set(&words);
    assert_eq!(set.len(), 1);
    assert!(set.contains("casa"));
  }
}
