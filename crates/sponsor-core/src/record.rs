//! Sponsor and target records as seen by the matching engine.
//!
//! Sponsors are read-only to the engine. Targets carry a sponsor flag, a
//! matched-sponsor reference and a flag timestamp; those three fields only
//! ever change together, through a [`FlagUpdate`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Sponsor ─────────────────────────────────────────────────────────────────

/// An entry in the authoritative sponsor directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorRecord {
  pub sponsor_id:      Uuid,
  /// Canonical display name; the name the lookup index is built from.
  pub name:            String,
  /// Secondary display names (trading names, former names).
  #[serde(default)]
  pub alternate_names: Vec<String>,
  pub active:          bool,
}

impl SponsorRecord {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      sponsor_id:      Uuid::new_v4(),
      name:            name.into(),
      alternate_names: vec![],
      active:          true,
    }
  }

  /// The canonical name followed by every alternate name.
  pub fn names(&self) -> impl Iterator<Item = &str> {
    std::iter::once(self.name.as_str())
      .chain(self.alternate_names.iter().map(String::as_str))
  }
}

// ─── Target ──────────────────────────────────────────────────────────────────

/// An employer whose sponsor status is being determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
  pub target_id:       Uuid,
  /// Raw employer name as entered in the target store.
  pub name:            String,
  pub is_sponsor:      bool,
  pub matched_sponsor: Option<Uuid>,
  /// `None` if the flag has never been evaluated.
  pub flag_updated_at: Option<DateTime<Utc>>,
}

impl TargetRecord {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      target_id:       Uuid::new_v4(),
      name:            name.into(),
      is_sponsor:      false,
      matched_sponsor: None,
      flag_updated_at: None,
    }
  }

  /// Flagged as a sponsor and pointing at a specific sponsor record.
  pub fn has_reference(&self) -> bool {
    self.is_sponsor && self.matched_sponsor.is_some()
  }

  /// Apply `update` in memory, keeping the flag invariant.
  pub fn apply(&mut self, update: FlagUpdate, at: DateTime<Utc>) {
    self.is_sponsor = update.is_sponsor();
    self.matched_sponsor = update.sponsor_id();
    self.flag_updated_at = Some(at);
  }
}

// ─── Flag writes ─────────────────────────────────────────────────────────────

/// The only shapes a flag write can take.
///
/// A reference without a flag, or a cleared flag that keeps its reference,
/// is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "sponsor_id", rename_all = "snake_case")]
pub enum FlagUpdate {
  Matched(Uuid),
  Cleared,
}

impl FlagUpdate {
  pub fn is_sponsor(&self) -> bool { matches!(self, Self::Matched(_)) }

  pub fn sponsor_id(&self) -> Option<Uuid> {
    match self {
      Self::Matched(id) => Some(*id),
      Self::Cleared => None,
    }
  }
}

/// Aggregate flag counts over the whole target store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagStats {
  pub total:           u64,
  pub flagged:         u64,
  pub never_updated:   u64,
  pub last_updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn apply_keeps_flag_and_reference_together() {
    let mut target = TargetRecord::new("Acme");
    let sponsor = Uuid::new_v4();
    let at = Utc::now();

    target.apply(FlagUpdate::Matched(sponsor), at);
    assert!(target.is_sponsor);
    assert_eq!(target.matched_sponsor, Some(sponsor));
    assert_eq!(target.flag_updated_at, Some(at));

    target.apply(FlagUpdate::Cleared, at);
    assert!(!target.is_sponsor);
    assert_eq!(target.matched_sponsor, None);
  }

  #[test]
  fn names_yields_canonical_first() {
    let mut sponsor = SponsorRecord::new("Acme Corporation");
    sponsor.alternate_names = vec!["Acme Widgets".into()];
    let names: Vec<&str> = sponsor.names().collect();
    assert_eq!(names, ["Acme Corporation", "Acme Widgets"]);
  }
}
