//! Repository traits for the sponsor directory and the target store.
//!
//! The reconciliation job depends on these abstractions, not on any concrete
//! backend. `sponsor-store-sqlite` implements both; [`crate::memory`] offers
//! in-memory fakes.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::record::{FlagStats, FlagUpdate, SponsorRecord, TargetRecord};

// ─── Bulk fetch results ──────────────────────────────────────────────────────

/// Records returned by a bulk fetch, plus those the backend could not decode.
///
/// A malformed row or document never fails the whole fetch; it is reported
/// here and left out of `records`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded<T> {
  pub records: Vec<T>,
  pub skipped: Vec<SkippedRecord>,
}

/// A stored record that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
  /// Backend identifier of the record, as stored.
  pub id:     String,
  pub reason: String,
}

impl<T> Default for Loaded<T> {
  fn default() -> Self { Self { records: vec![], skipped: vec![] } }
}

impl<T> From<Vec<T>> for Loaded<T> {
  fn from(records: Vec<T>) -> Self { Self { records, skipped: vec![] } }
}

// ─── Error classification ────────────────────────────────────────────────────

/// Backend errors must say whether the store itself is unreachable.
///
/// Unavailability aborts a run; any other error is scoped to the record that
/// triggered it.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn is_unavailable(&self) -> bool;
}

// ─── Sponsor directory ───────────────────────────────────────────────────────

/// Read-only access to the authoritative sponsor directory.
pub trait SponsorRepository: Send + Sync {
  type Error: StoreError;

  /// All sponsors flagged active, ordered by name then id.
  fn fetch_active_sponsors(
    &self,
  ) -> impl Future<Output = Result<Loaded<SponsorRecord>, Self::Error>> + Send + '_;

  /// A single sponsor by id, active or not. Returns `None` if absent.
  fn get_sponsor(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<SponsorRecord>, Self::Error>> + Send + '_;

  /// Number of active sponsors.
  fn count_active(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}

// ─── Target store ────────────────────────────────────────────────────────────

/// Access to the employer records whose sponsor flag is maintained.
///
/// Every write touches exactly one record's flag, reference and timestamp as
/// a unit. There is no cross-record transaction except
/// [`bulk_reset_flags`](TargetRepository::bulk_reset_flags).
pub trait TargetRepository: Send + Sync {
  type Error: StoreError;

  /// Targets never evaluated, or last evaluated more than `staleness_days`
  /// ago. Never-evaluated first, then oldest first; at most `limit`.
  fn fetch_stale_targets(
    &self,
    staleness_days: u32,
    limit: usize,
  ) -> impl Future<Output = Result<Loaded<TargetRecord>, Self::Error>> + Send + '_;

  /// Every target in the store.
  fn fetch_all_targets(
    &self,
  ) -> impl Future<Output = Result<Loaded<TargetRecord>, Self::Error>> + Send + '_;

  /// Targets flagged as sponsors that carry a sponsor reference.
  fn fetch_flagged_targets(
    &self,
  ) -> impl Future<Output = Result<Loaded<TargetRecord>, Self::Error>> + Send + '_;

  /// Atomically write flag, reference and timestamp for one target.
  fn update_flag(
    &self,
    id: Uuid,
    update: FlagUpdate,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Clear the flag of every target in `ids`. Returns the number of rows
  /// written.
  fn bulk_reset_flags(
    &self,
    ids: Vec<Uuid>,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Aggregate counts used by the maintenance scheduler.
  fn flag_stats(
    &self,
  ) -> impl Future<Output = Result<FlagStats, Self::Error>> + Send + '_;
}
