//! Best-match selection for a single target name.
//!
//! Every (target variant, candidate variant) pair is scored; the best pair
//! that clears the threshold wins. Ties keep the first pair seen, so the
//! iteration order is candidates in the given order, then target variants,
//! then candidate variants.

use crate::{
  Error, Result,
  normalize::normalize,
  record::SponsorRecord,
  similarity::score,
  variant::{sponsor_variants, variants},
};

/// Similarity a pair must reach to count as a match.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// The winning candidate for one target name.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<'a> {
  pub sponsor:         &'a SponsorRecord,
  /// Similarity in `[0, 1]`.
  pub score:           f64,
  /// The target-name variant of the winning pair.
  pub target_variant:  String,
  /// The sponsor-name variant of the winning pair.
  pub sponsor_variant: String,
}

/// Threshold-gated matcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matcher {
  threshold:       f64,
  include_aliases: bool,
}

impl Default for Matcher {
  fn default() -> Self {
    Self { threshold: DEFAULT_THRESHOLD, include_aliases: false }
  }
}

impl Matcher {
  /// Returns an error if `threshold` is NaN or outside `[0, 1]`.
  pub fn new(threshold: f64) -> Result<Self> {
    if !(0.0..=1.0).contains(&threshold) {
      return Err(Error::InvalidThreshold(threshold));
    }
    Ok(Self { threshold, include_aliases: false })
  }

  /// Also score the variants of each candidate's alternate names.
  pub fn with_aliases(mut self, include_aliases: bool) -> Self {
    self.include_aliases = include_aliases;
    self
  }

  pub fn threshold(&self) -> f64 { self.threshold }

  /// Find the best candidate for `target_name`, or `None` if no pair scores
  /// at least the threshold. A name that normalizes to nothing never matches.
  pub fn find_best_match<'a, I>(
    &self,
    target_name: &str,
    candidates: I,
  ) -> Option<MatchResult<'a>>
  where
    I: IntoIterator<Item = &'a SponsorRecord>,
  {
    if normalize(target_name).is_empty() {
      return None;
    }
    let target_variants = variants(target_name);

    let mut best: Option<MatchResult<'a>> = None;

    for sponsor in candidates {
      let candidate_variants = sponsor_variants(sponsor, self.include_aliases);

      for target_variant in &target_variants {
        for candidate_variant in &candidate_variants {
          let s = score(target_variant, candidate_variant);
          if s < self.threshold {
            continue;
          }
          if best.as_ref().is_some_and(|b| s <= b.score) {
            continue;
          }
          best = Some(MatchResult {
            sponsor,
            score: s,
            target_variant: target_variant.clone(),
            sponsor_variant: candidate_variant.clone(),
          });
        }
      }
    }

    best
  }
}

/// Match `target_name` against the canonical names of `candidates`.
///
/// Returns [`Error::InvalidThreshold`] for a threshold outside `[0, 1]`.
pub fn find_best_match<'a, I>(
  target_name: &str,
  candidates: I,
  threshold: f64,
) -> Result<Option<MatchResult<'a>>>
where
  I: IntoIterator<Item = &'a SponsorRecord>,
{
  Ok(Matcher::new(threshold)?.find_best_match(target_name, candidates))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::index::LookupIndex;

  fn sponsors(names: &[&str]) -> Vec<SponsorRecord> {
    names.iter().copied().map(SponsorRecord::new).collect()
  }

  #[test]
  fn suffix_variance_matches_exactly() {
    let directory = sponsors(&["Acme Corporation"]);
    let m = find_best_match("ACME CORP.", &directory, DEFAULT_THRESHOLD)
      .unwrap()
      .expect("match");
    assert_eq!(m.sponsor.name, "Acme Corporation");
    assert_eq!(m.score, 1.0);
  }

  #[test]
  fn acronym_path_matches_exactly() {
    let directory = sponsors(&["International Business Machines"]);
    let m = find_best_match("IBM", &directory, DEFAULT_THRESHOLD)
      .unwrap()
      .expect("match");
    assert_eq!(m.score, 1.0);
    assert_eq!(m.target_variant, "ibm");
    assert_eq!(m.sponsor_variant, "ibm");
  }

  #[test]
  fn nothing_above_threshold_is_none() {
    let directory = sponsors(&["Zenith Pharmaceuticals"]);
    let m = find_best_match("Acme Widgets", &directory, DEFAULT_THRESHOLD).unwrap();
    assert!(m.is_none());
  }

  #[test]
  fn empty_candidates_or_name_is_none() {
    let directory = sponsors(&["Acme"]);
    let none: Vec<SponsorRecord> = vec![];
    assert!(find_best_match("Acme", &none, 0.5).unwrap().is_none());
    assert!(find_best_match("", &directory, 0.0).unwrap().is_none());
  }

  #[test]
  fn punctuation_only_target_is_none() {
    let directory = sponsors(&["--", "Acme"]);
    assert!(find_best_match("&&", &directory, DEFAULT_THRESHOLD).unwrap().is_none());
    assert!(find_best_match("&&", &directory, 0.0).unwrap().is_none());
    assert!(find_best_match("...", &sponsors(&["..."]), DEFAULT_THRESHOLD).unwrap().is_none());
  }

  #[test]
  fn threshold_is_inclusive() {
    let directory = sponsors(&["Initek"]);
    let exact = score("Initech", "Initek");

    let at = find_best_match("Initech", &directory, exact).unwrap();
    assert_eq!(at.map(|m| m.score), Some(exact));

    let above = find_best_match("Initech", &directory, exact + 1e-9).unwrap();
    assert!(above.is_none());
  }

  #[test]
  fn higher_score_wins_regardless_of_order() {
    let directory = sponsors(&["Globexx", "Globex"]);
    let m = find_best_match("Globex", &directory, 0.5)
      .unwrap()
      .expect("match");
    assert_eq!(m.sponsor.name, "Globex");
    assert_eq!(m.score, 1.0);
  }

  #[test]
  fn two_word_acronyms_collide() {
    // Known imprecision: unrelated two-word names share a two-letter acronym
    // and score as an exact match through it.
    let directory = sponsors(&["Apex Wireless"]);
    let m = find_best_match("Acme Widgets", &directory, DEFAULT_THRESHOLD)
      .unwrap()
      .expect("acronym collision");
    assert_eq!(m.sponsor_variant, "aw");
    assert_eq!(m.score, 1.0);
  }

  #[test]
  fn ties_keep_the_first_candidate() {
    let directory = sponsors(&["Acme Inc", "Acme LLC"]);
    let m = find_best_match("Acme", &directory, DEFAULT_THRESHOLD)
      .unwrap()
      .expect("match");
    assert_eq!(m.sponsor.name, "Acme Inc");

    let reversed: Vec<SponsorRecord> = directory.into_iter().rev().collect();
    let m = find_best_match("Acme", &reversed, DEFAULT_THRESHOLD)
      .unwrap()
      .expect("match");
    assert_eq!(m.sponsor.name, "Acme LLC");
  }

  #[test]
  fn invalid_threshold_is_rejected() {
    assert!(matches!(Matcher::new(1.5), Err(Error::InvalidThreshold(_))));
    assert!(matches!(Matcher::new(-0.1), Err(Error::InvalidThreshold(_))));
    assert!(Matcher::new(f64::NAN).is_err());
  }

  #[test]
  fn aliases_extend_the_scored_variants() {
    let mut sponsor = SponsorRecord::new("Acme Corporation");
    sponsor.alternate_names = vec!["Roadrunner Supply".into()];
    let directory = vec![sponsor];

    assert!(Matcher::default().find_best_match("Roadrunner Supply Co", &directory).is_none());
    let m = Matcher::default()
      .with_aliases(true)
      .find_best_match("Roadrunner Supply Co", &directory)
      .expect("alias match");
    assert_eq!(m.score, 1.0);
  }

  #[test]
  fn index_then_match_end_to_end() {
    let index = LookupIndex::build(sponsors(&[
      "Acme Corporation",
      "International Business Machines",
      "Smith & Associates LLC",
    ]));
    let matcher = Matcher::default();

    for (target, expected) in [
      ("ACME CORP.", "Acme Corporation"),
      ("IBM", "International Business Machines"),
      ("Smith Associates", "Smith & Associates LLC"),
    ] {
      let m = matcher
        .find_best_match(target, index.query(target))
        .unwrap_or_else(|| panic!("no match for {target:?}"));
      assert_eq!(m.sponsor.name, expected);
      assert_eq!(m.score, 1.0);
    }

    let candidates = index.query("Unrelated Startup Co");
    assert!(candidates.is_empty());
    assert!(matcher.find_best_match("Unrelated Startup Co", candidates).is_none());
  }
}
