//! Similarity between two employer names, in `[0, 1]`.
//!
//! Edit distance catches spelling variance; word overlap catches reordering
//! and partial names. Overlap alone is discounted so it can never declare a
//! perfect match.

use std::collections::HashSet;

use crate::normalize::normalize;

/// Weight applied to the word-overlap component.
pub const OVERLAP_WEIGHT: f64 = 0.8;

/// Score the similarity of two raw names.
///
/// Both inputs are normalized first. Identical normalized forms score exactly
/// `1.0`; an input that normalizes to nothing scores `0.0`.
pub fn score(a: &str, b: &str) -> f64 {
  let a = normalize(a);
  let b = normalize(b);
  if a.is_empty() || b.is_empty() {
    return 0.0;
  }
  if a == b {
    return 1.0;
  }

  edit_similarity(&a, &b).max(token_overlap(&a, &b) * OVERLAP_WEIGHT)
}

/// `1 - levenshtein(a, b) / max(len(a), len(b))`, counted in characters.
pub fn edit_similarity(a: &str, b: &str) -> f64 {
  let longest = a.chars().count().max(b.chars().count());
  if longest == 0 {
    return 0.0;
  }
  let distance = strsim::levenshtein(a, b);
  1.0 - distance as f64 / longest as f64
}

/// Jaccard overlap of the word sets of `a` and `b`, ignoring one-character
/// words.
pub fn token_overlap(a: &str, b: &str) -> f64 {
  let left = tokens(a);
  let right = tokens(b);

  let union = left.union(&right).count();
  if union == 0 {
    return 0.0;
  }
  left.intersection(&right).count() as f64 / union as f64
}

fn tokens(s: &str) -> HashSet<&str> {
  s.split_whitespace().filter(|w| w.chars().count() > 1).collect()
}


#[cfg(test)]
mod proptests {
  use proptest::prelude::*;

  use super::*;

  proptest! {
    #[test]
    fn score_is_symmetric(a in "\\PC{0,32}", b in "\\PC{0,32}") {
      prop_assert_eq!(score(&a, &b), score(&b, &a));
    }

    #[test]
    fn score_is_bounded(a in "[A-Za-z0-9 .,&'-]{0,40}", b in "[A-Za-z0-9 .,&'-]{0,40}") {
      let s = score(&a, &b);
      prop_assert!((0.0..=1.0).contains(&s), "{} for {:?} / {:?}", s, a, b);
    }

    #[test]
    fn a_name_matches_itself_unless_blank(a in "\\PC{0,32}") {
      let expected = if normalize(&a).is_empty() { 0.0 } else { 1.0 };
      prop_assert_eq!(score(&a, &a), expected);
    }
  }
}
