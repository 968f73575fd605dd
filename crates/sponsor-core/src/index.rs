//! Inverted lookup index from variant string to sponsor records.
//!
//! Built once per run from the loaded sponsor set and never mutated
//! afterwards, so it can be shared read-only across matching tasks. Only
//! sponsors sharing at least one exact variant string with a query name are
//! returned as candidates.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::{
  record::SponsorRecord,
  variant::{sponsor_variants, variants},
};

/// Build-time options for [`LookupIndex`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOptions {
  /// Also index the variants of every alternate sponsor name.
  pub include_aliases: bool,
}

/// Variant string → positions in the owned sponsor list.
#[derive(Debug, Clone, Default)]
pub struct LookupIndex {
  sponsors: Vec<SponsorRecord>,
  entries:  HashMap<String, Vec<usize>>,
  options:  IndexOptions,
}

impl LookupIndex {
  /// Index the canonical name of every sponsor.
  pub fn build(sponsors: Vec<SponsorRecord>) -> Self {
    Self::build_with(sponsors, IndexOptions::default())
  }

  pub fn build_with(sponsors: Vec<SponsorRecord>, options: IndexOptions) -> Self {
    let mut entries: HashMap<String, Vec<usize>> = HashMap::new();

    for (position, sponsor) in sponsors.iter().enumerate() {
      for variant in sponsor_variants(sponsor, options.include_aliases) {
        entries.entry(variant).or_default().push(position);
      }
    }

    Self { sponsors, entries, options }
  }

  /// Candidate sponsors for `name`: every sponsor sharing at least one
  /// variant with it, deduplicated by id, in first-seen order.
  pub fn query(&self, name: &str) -> Vec<&SponsorRecord> {
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut out = Vec::new();

    for variant in variants(name) {
      let Some(positions) = self.entries.get(&variant) else {
        continue;
      };
      for &position in positions {
        let sponsor = &self.sponsors[position];
        if seen.insert(sponsor.sponsor_id) {
          out.push(sponsor);
        }
      }
    }

    out
  }

  /// Every indexed sponsor, in load order. Used by the full-scan strategy.
  pub fn sponsors(&self) -> &[SponsorRecord] { &self.sponsors }

  pub fn options(&self) -> IndexOptions { self.options }

  /// Number of indexed sponsors.
  pub fn len(&self) -> usize { self.sponsors.len() }

  pub fn is_empty(&self) -> bool { self.sponsors.is_empty() }

  /// Number of distinct variant strings.
  pub fn variant_count(&self) -> usize { self.entries.len() }
}
