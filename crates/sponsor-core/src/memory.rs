//! In-memory implementations of the repository traits.
//!
//! Used by tests and by callers embedding the engine without a database.
//! Both stores are cheap to clone; clones share state. Failure injection
//! (going offline, failing writes for specific targets) lets callers exercise
//! the job's fatal and per-record error paths.

use std::{
  collections::HashSet,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  record::{FlagStats, FlagUpdate, SponsorRecord, TargetRecord},
  store::{Loaded, SponsorRepository, StoreError, TargetRepository},
};

#[derive(Debug, Error)]
pub enum MemoryError {
  #[error("store is offline")]
  Unavailable,

  #[error("target not found: {0}")]
  TargetNotFound(Uuid),

  #[error("write rejected for target {0}")]
  Rejected(Uuid),
}

impl StoreError for MemoryError {
  fn is_unavailable(&self) -> bool { matches!(self, Self::Unavailable) }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
  m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Sponsors ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SponsorState {
  sponsors: Vec<SponsorRecord>,
  offline:  bool,
}

/// In-memory sponsor directory.
#[derive(Debug, Clone, Default)]
pub struct MemorySponsorStore {
  state: Arc<Mutex<SponsorState>>,
}

impl MemorySponsorStore {
  pub fn new(sponsors: impl IntoIterator<Item = SponsorRecord>) -> Self {
    let store = Self::default();
    lock(&store.state).sponsors = sponsors.into_iter().collect();
    store
  }

  pub fn insert(&self, sponsor: SponsorRecord) { lock(&self.state).sponsors.push(sponsor); }

  /// Flip a sponsor's active flag. Returns `false` if the id is unknown.
  pub fn set_active(&self, id: Uuid, active: bool) -> bool {
    let mut state = lock(&self.state);
    match state.sponsors.iter_mut().find(|s| s.sponsor_id == id) {
      Some(sponsor) => {
        sponsor.active = active;
        true
      }
      None => false,
    }
  }

  pub fn remove(&self, id: Uuid) { lock(&self.state).sponsors.retain(|s| s.sponsor_id != id); }

  pub fn set_offline(&self, offline: bool) { lock(&self.state).offline = offline; }
}

impl SponsorRepository for MemorySponsorStore {
  type Error = MemoryError;

  async fn fetch_active_sponsors(&self) -> Result<Loaded<SponsorRecord>, MemoryError> {
    let state = lock(&self.state);
    if state.offline {
      return Err(MemoryError::Unavailable);
    }
    let mut active: Vec<SponsorRecord> =
      state.sponsors.iter().filter(|s| s.active).cloned().collect();
    active.sort_by(|a, b| a.name.cmp(&b.name).then(a.sponsor_id.cmp(&b.sponsor_id)));
    Ok(active.into())
  }

  async fn get_sponsor(&self, id: Uuid) -> Result<Option<SponsorRecord>, MemoryError> {
    let state = lock(&self.state);
    if state.offline {
      return Err(MemoryError::Unavailable);
    }
    Ok(state.sponsors.iter().find(|s| s.sponsor_id == id).cloned())
  }

  async fn count_active(&self) -> Result<u64, MemoryError> {
    let state = lock(&self.state);
    if state.offline {
      return Err(MemoryError::Unavailable);
    }
    Ok(state.sponsors.iter().filter(|s| s.active).count() as u64)
  }
}

// ─── Targets ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct TargetState {
  targets:  Vec<TargetRecord>,
  offline:  bool,
  rejected: HashSet<Uuid>,
  writes:   usize,
}

impl TargetState {
  fn online(&self) -> Result<(), MemoryError> {
    if self.offline { Err(MemoryError::Unavailable) } else { Ok(()) }
  }
}

/// In-memory target store.
#[derive(Debug, Clone, Default)]
pub struct MemoryTargetStore {
  state: Arc<Mutex<TargetState>>,
}

impl MemoryTargetStore {
  pub fn new(targets: impl IntoIterator<Item = TargetRecord>) -> Self {
    let store = Self::default();
    lock(&store.state).targets = targets.into_iter().collect();
    store
  }

  pub fn insert(&self, target: TargetRecord) { lock(&self.state).targets.push(target); }

  pub fn get(&self, id: Uuid) -> Option<TargetRecord> {
    lock(&self.state).targets.iter().find(|t| t.target_id == id).cloned()
  }

  pub fn snapshot(&self) -> Vec<TargetRecord> { lock(&self.state).targets.clone() }

  pub fn set_offline(&self, offline: bool) { lock(&self.state).offline = offline; }

  /// Make every subsequent write to `id` fail with [`MemoryError::Rejected`].
  pub fn reject_writes_for(&self, id: Uuid) { lock(&self.state).rejected.insert(id); }

  /// Number of successful single-record and bulk writes.
  pub fn write_count(&self) -> usize { lock(&self.state).writes }
}

impl TargetRepository for MemoryTargetStore {
  type Error = MemoryError;

  async fn fetch_stale_targets(
    &self,
    staleness_days: u32,
    limit: usize,
  ) -> Result<Loaded<TargetRecord>, MemoryError> {
    let state = lock(&self.state);
    state.online()?;

    let cutoff = Utc::now() - Duration::days(i64::from(staleness_days));
    let mut stale: Vec<TargetRecord> = state
      .targets
      .iter()
      .filter(|t| t.flag_updated_at.is_none_or(|at| at < cutoff))
      .cloned()
      .collect();
    // `None` sorts before `Some`, so never-evaluated targets come first.
    stale.sort_by_key(|t| t.flag_updated_at);
    stale.truncate(limit);
    Ok(stale.into())
  }

  async fn fetch_all_targets(&self) -> Result<Loaded<TargetRecord>, MemoryError> {
    let state = lock(&self.state);
    state.online()?;
    Ok(state.targets.clone().into())
  }

  async fn fetch_flagged_targets(&self) -> Result<Loaded<TargetRecord>, MemoryError> {
    let state = lock(&self.state);
    state.online()?;
    let flagged: Vec<TargetRecord> =
      state.targets.iter().filter(|t| t.has_reference()).cloned().collect();
    Ok(flagged.into())
  }

  async fn update_flag(
    &self,
    id: Uuid,
    update: FlagUpdate,
    at: DateTime<Utc>,
  ) -> Result<(), MemoryError> {
    let mut state = lock(&self.state);
    state.online()?;
    if state.rejected.contains(&id) {
      return Err(MemoryError::Rejected(id));
    }
    let target = state
      .targets
      .iter_mut()
      .find(|t| t.target_id == id)
      .ok_or(MemoryError::TargetNotFound(id))?;
    target.apply(update, at);
    state.writes += 1;
    Ok(())
  }

  async fn bulk_reset_flags(
    &self,
    ids: Vec<Uuid>,
    at: DateTime<Utc>,
  ) -> Result<u64, MemoryError> {
    let mut state = lock(&self.state);
    state.online()?;
    let wanted: HashSet<Uuid> = ids.into_iter().collect();
    let mut written = 0;
    for target in state.targets.iter_mut().filter(|t| wanted.contains(&t.target_id)) {
      target.apply(FlagUpdate::Cleared, at);
      written += 1;
    }
    state.writes += 1;
    Ok(written)
  }

  async fn flag_stats(&self) -> Result<FlagStats, MemoryError> {
    let state = lock(&self.state);
    state.online()?;
    Ok(FlagStats {
      total:           state.targets.len() as u64,
      flagged:         state.targets.iter().filter(|t| t.is_sponsor).count() as u64,
      never_updated:   state
        .targets
        .iter()
        .filter(|t| t.flag_updated_at.is_none())
        .count() as u64,
      last_updated_at: state.targets.iter().filter_map(|t| t.flag_updated_at).max(),
    })
  }
}
