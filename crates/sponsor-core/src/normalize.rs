//! Employer-name normalization.
//!
//! [`normalize`] reduces a raw employer name to a canonical matching string:
//! lowercase, punctuation-free, without trailing legal suffixes, with common
//! abbreviations expanded and stop-words removed. It is pure, total and
//! idempotent.

// ─── Word tables ─────────────────────────────────────────────────────────────

/// Legal and organizational suffixes stripped from the end of a name.
const LEGAL_SUFFIXES: &[&str] = &[
  "ag",
  "associates",
  "bv",
  "co",
  "company",
  "corp",
  "corporation",
  "enterprises",
  "gmbh",
  "group",
  "grp",
  "hldgs",
  "holding",
  "holdings",
  "inc",
  "incorporated",
  "kg",
  "limited",
  "llc",
  "llp",
  "lp",
  "ltd",
  "nv",
  "pa",
  "partners",
  "partnership",
  "pc",
  "plc",
  "pllc",
  "sa",
  "technologies",
];

/// Abbreviation → expansion.
///
/// An abbreviation whose expansion is a legal suffix must itself be a legal
/// suffix, and no expansion may be another abbreviation.
const ABBREVIATIONS: &[(&str, &str)] = &[
  ("assn", "association"),
  ("assoc", "association"),
  ("bros", "brothers"),
  ("co", "company"),
  ("corp", "corporation"),
  ("ctr", "center"),
  ("dept", "department"),
  ("dev", "development"),
  ("engr", "engineering"),
  ("grp", "group"),
  ("hldgs", "holdings"),
  ("hosp", "hospital"),
  ("inc", "incorporated"),
  ("intl", "international"),
  ("ltd", "limited"),
  ("med", "medical"),
  ("mfg", "manufacturing"),
  ("mgmt", "management"),
  ("natl", "national"),
  ("svc", "service"),
  ("svcs", "services"),
  ("sys", "systems"),
  ("tech", "technology"),
  ("univ", "university"),
];

const STOP_WORDS: &[&str] = &[
  "a", "an", "and", "at", "by", "for", "from", "in", "of", "on", "or", "the", "to",
  "with",
];

pub fn is_legal_suffix(word: &str) -> bool { LEGAL_SUFFIXES.contains(&word) }

pub fn is_stop_word(word: &str) -> bool { STOP_WORDS.contains(&word) }

fn expand(word: &str) -> &str {
  ABBREVIATIONS
    .iter()
    .find(|(abbr, _)| *abbr == word)
    .map_or(word, |(_, full)| *full)
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Lowercase, replace punctuation with spaces and collapse whitespace.
///
/// No words are removed; this is the "punctuation-stripped" form used by the
/// variant generator.
pub fn strip_punctuation(name: &str) -> String {
  name
    .to_lowercase()
    .chars()
    .map(|c| {
      if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' }
    })
    .collect::<String>()
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

/// Normalize an employer name for matching.
///
/// Returns an empty string for empty or punctuation-only input. At least one
/// word survives for any input that contains an alphanumeric character.
pub fn normalize(name: &str) -> String {
  let mut current = normalize_once(name);
  // Dropping a stop-word can expose a trailing suffix, so settle on a fixed
  // point. Each unsettled pass drops or expands a word.
  loop {
    let next = normalize_once(&current);
    if next == current {
      return current;
    }
    current = next;
  }
}

fn normalize_once(name: &str) -> String {
  let cleaned = strip_punctuation(name);
  let mut words: Vec<&str> = cleaned.split(' ').filter(|w| !w.is_empty()).collect();

  while words.len() > 1 && words.last().is_some_and(|w| is_legal_suffix(w)) {
    words.pop();
  }

  let expanded: Vec<&str> = words.into_iter().map(expand).collect();

  let content: Vec<&str> = expanded
    .iter()
    .copied()
    .filter(|w| !is_stop_word(w))
    .collect();

  if content.is_empty() { expanded.join(" ") } else { content.join(" ") }
}
