//! Alternate string forms of a name used for candidate retrieval and scoring.

use crate::{
  normalize::{is_legal_suffix, is_stop_word, normalize, strip_punctuation},
  record::SponsorRecord,
};

/// Generate the matching variants of `name`.
///
/// The result is an insertion-ordered set: lowercase-trimmed original,
/// normalized form, punctuation-stripped form, then the acronym of the
/// significant words (only for multi-word names, only if it has at least two
/// letters). Empty strings never appear. For non-empty input the first entry
/// is always the lowercase-trimmed original.
pub fn variants(name: &str) -> Vec<String> {
  let mut out: Vec<String> = Vec::with_capacity(4);

  let lowered = name.to_lowercase();
  push_unique(&mut out, lowered.trim().to_owned());
  push_unique(&mut out, normalize(name));

  let stripped = strip_punctuation(name);
  let initials = acronym(&stripped);
  push_unique(&mut out, stripped);
  if let Some(initials) = initials {
    push_unique(&mut out, initials);
  }

  out
}

/// Variants of a sponsor's canonical name, followed by the variants of each
/// alternate name when `include_aliases` is set.
pub fn sponsor_variants(sponsor: &SponsorRecord, include_aliases: bool) -> Vec<String> {
  if !include_aliases {
    return variants(&sponsor.name);
  }

  let mut out = Vec::new();
  for name in sponsor.names() {
    for v in variants(name) {
      push_unique(&mut out, v);
    }
  }
  out
}

/// First letters of the words in `stripped` that are neither legal suffixes
/// nor stop-words.
fn acronym(stripped: &str) -> Option<String> {
  let words: Vec<&str> = stripped.split(' ').filter(|w| !w.is_empty()).collect();
  if words.len() < 2 {
    return None;
  }

  let acronym: String = words
    .iter()
    .filter(|w| !is_legal_suffix(w) && !is_stop_word(w))
    .filter_map(|w| w.chars().next())
    .collect();

  (acronym.chars().count() >= 2).then_some(acronym)
}

fn push_unique(out: &mut Vec<String>, candidate: String) {
  if !candidate.is_empty() && !out.contains(&candidate) {
    out.push(candidate);
  }
}
