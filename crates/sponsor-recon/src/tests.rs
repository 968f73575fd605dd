//! End-to-end tests of the reconciliation job against in-memory and SQLite
//! stores.

use chrono::{DateTime, Duration, Utc};
use sponsor_core::{
  memory::{MemoryError, MemorySponsorStore, MemoryTargetStore},
  record::{FlagStats, FlagUpdate, SponsorRecord, TargetRecord},
  store::{Loaded, SponsorRepository, TargetRepository},
};
use sponsor_store_sqlite::{SqliteSponsorStore, SqliteTargetStore};
use uuid::Uuid;

use crate::{
  CancelFlag, Error, MatchStrategy, ReconConfig, Reconciler, RunMode,
  report::RunReport,
};

const SPONSORS: [&str; 3] = [
  "Acme Corporation",
  "International Business Machines",
  "Smith & Associates LLC",
];

const TARGETS: [&str; 5] = [
  "ACME CORP.",
  "IBM",
  "Smith Associates",
  "Unrelated Startup Co",
  "!!!",
];

struct Fixture {
  sponsors: MemorySponsorStore,
  targets:  MemoryTargetStore,
}

impl Fixture {
  fn new() -> Self {
    Self {
      sponsors: MemorySponsorStore::new(SPONSORS.map(SponsorRecord::new)),
      targets:  MemoryTargetStore::new(TARGETS.map(TargetRecord::new)),
    }
  }

  fn reconciler(&self, config: ReconConfig) -> Reconciler<MemorySponsorStore, MemoryTargetStore> {
    Reconciler::new(self.sponsors.clone(), self.targets.clone(), config).unwrap()
  }

  fn target(&self, name: &str) -> TargetRecord {
    self
      .targets
      .snapshot()
      .into_iter()
      .find(|t| t.name == name)
      .expect("target exists")
  }

  fn sponsor_id(&self, name: &str) -> Uuid {
    futures::executor::block_on(async {
      self
        .sponsors
        .fetch_active_sponsors()
        .await
        .unwrap()
        .records
        .into_iter()
        .find(|s| s.name == name)
        .expect("sponsor exists")
        .sponsor_id
    })
  }
}

async fn run(
  r: &Reconciler<impl SponsorRepository, impl TargetRepository>,
  mode: RunMode,
) -> RunReport {
  r.run(mode, &CancelFlag::new()).await.expect("run succeeds")
}

// ─── Full runs ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_flags_every_matching_target() {
  let fx = Fixture::new();
  let report = run(&fx.reconciler(ReconConfig::default()), RunMode::Full).await;

  let stats = &report.statistics;
  assert_eq!(stats.total_sponsors, 3);
  assert_eq!(stats.total_targets, 5);
  assert_eq!(stats.targets_processed, 5);
  assert_eq!(stats.matches_found, 3);
  assert_eq!(stats.flags_updated, 3);
  assert_eq!(stats.flags_removed, 0);
  assert_eq!(stats.errors, 1);
  assert!(!report.cancelled);
  assert_eq!(report.mode, RunMode::Full);

  for (target, sponsor) in [
    ("ACME CORP.", "Acme Corporation"),
    ("IBM", "International Business Machines"),
    ("Smith Associates", "Smith & Associates LLC"),
  ] {
    let t = fx.target(target);
    assert!(t.is_sponsor, "{target} should be flagged");
    assert_eq!(t.matched_sponsor, Some(fx.sponsor_id(sponsor)));
    assert!(t.flag_updated_at.is_some());
  }

  let unrelated = fx.target("Unrelated Startup Co");
  assert!(!unrelated.is_sponsor);
  assert_eq!(unrelated.matched_sponsor, None);
  assert_eq!(unrelated.flag_updated_at, None);

  assert_eq!(report.top_matches.len(), 3);
  assert!(report.top_matches.iter().all(|m| m.similarity_percent == 100.0));
  assert_eq!(report.error_sample.len(), 1);
  assert_eq!(report.error_sample[0].target_name, "!!!");
}

#[tokio::test]
async fn full_scan_agrees_with_the_index() {
  let indexed = Fixture::new();
  let scanned = Fixture::new();
  let config = ReconConfig { strategy: MatchStrategy::FullScan, ..Default::default() };

  let a = run(&indexed.reconciler(ReconConfig::default()), RunMode::Full).await;
  let b = run(&scanned.reconciler(config), RunMode::Full).await;
  assert_eq!(a.statistics, b.statistics);
}

#[tokio::test]
async fn concurrent_persistence_writes_the_same_flags() {
  let fx = Fixture::new();
  let config = ReconConfig { chunk_size: 2, persist_concurrency: 4, ..Default::default() };
  let report = run(&fx.reconciler(config), RunMode::Full).await;

  assert_eq!(report.statistics.flags_updated, 3);
  assert_eq!(fx.targets.snapshot().iter().filter(|t| t.is_sponsor).count(), 3);
}

#[tokio::test]
async fn invalid_config_is_rejected_up_front() {
  let fx = Fixture::new();
  let config = ReconConfig { persist_concurrency: 0, ..Default::default() };
  let result = Reconciler::new(fx.sponsors.clone(), fx.targets.clone(), config);
  assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

// ─── Fatal conditions ────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_sponsor_directory_is_fatal_and_writes_nothing() {
  let fx = Fixture::new();
  for id in fx.sponsors_ids() {
    fx.sponsors.set_active(id, false);
  }

  let err = fx
    .reconciler(ReconConfig::default())
    .run(RunMode::Full, &CancelFlag::new())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NoSponsors));
  assert_eq!(fx.targets.write_count(), 0);
}

#[tokio::test]
async fn empty_target_store_is_fatal() {
  let fx = Fixture { targets: MemoryTargetStore::default(), ..Fixture::new() };
  let err = fx
    .reconciler(ReconConfig::default())
    .run(RunMode::Full, &CancelFlag::new())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NoTargets));
}

#[tokio::test]
async fn unavailable_sponsor_store_is_fatal_and_writes_nothing() {
  let fx = Fixture::new();
  fx.sponsors.set_offline(true);

  let err = fx
    .reconciler(ReconConfig { reset_flags: true, ..Default::default() })
    .run(RunMode::Full, &CancelFlag::new())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Unavailable { stage: "loading sponsors", .. }));
  assert_eq!(fx.targets.write_count(), 0);
}

#[tokio::test]
async fn unavailable_target_store_during_persisting_is_fatal() {
  let fx = Fixture::new();
  let targets = Hooked { inner: fx.targets.clone(), hook: Hook::OfflineWrites };
  let r = Reconciler::new(fx.sponsors.clone(), targets, ReconConfig::default()).unwrap();

  let err = r.run(RunMode::Full, &CancelFlag::new()).await.unwrap_err();
  assert!(matches!(err, Error::Unavailable { stage: "persisting flags", .. }));
  assert_eq!(fx.targets.write_count(), 0);
}

// ─── Per-record failures ─────────────────────────────────────────────────────

#[tokio::test]
async fn rejected_write_is_counted_and_the_run_continues() {
  let fx = Fixture::new();
  fx.targets.reject_writes_for(fx.target("IBM").target_id);

  let report = run(&fx.reconciler(ReconConfig::default()), RunMode::Full).await;
  assert_eq!(report.statistics.matches_found, 3);
  assert_eq!(report.statistics.flags_updated, 2);
  assert_eq!(report.statistics.errors, 2);
  assert!(report.error_sample.iter().any(|e| e.target_name == "IBM"));
  assert!(!fx.target("IBM").is_sponsor);
  assert!(fx.target("Smith Associates").is_sponsor);
}

#[tokio::test]
async fn report_samples_are_bounded() {
  let fx = Fixture::new();
  for i in 0..4 {
    fx.targets.insert(TargetRecord::new("?".repeat(i + 1)));
  }
  let config = ReconConfig { report_sample_size: 2, ..Default::default() };
  let report = run(&fx.reconciler(config), RunMode::Full).await;

  assert_eq!(report.statistics.matches_found, 3);
  assert_eq!(report.top_matches.len(), 2);
  assert_eq!(report.statistics.errors, 5);
  assert_eq!(report.error_sample.len(), 2);
}

// ─── Cancellation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_before_start_still_reports() {
  let fx = Fixture::new();
  let cancel = CancelFlag::new();
  cancel.cancel();

  let report = fx
    .reconciler(ReconConfig::default())
    .run(RunMode::Full, &cancel)
    .await
    .unwrap();
  assert!(report.cancelled);
  assert_eq!(report.statistics.targets_processed, 0);
  assert_eq!(fx.targets.write_count(), 0);
  assert!(report.recommendations.iter().any(|r| r.contains("cancelled")));
}

#[tokio::test]
async fn cancellation_stops_before_the_next_target() {
  let fx = Fixture::new();
  let cancel = CancelFlag::new();
  let targets = Hooked { inner: fx.targets.clone(), hook: Hook::CancelOnWrite(cancel.clone()) };
  let config = ReconConfig { chunk_size: 1, ..Default::default() };
  let r = Reconciler::new(fx.sponsors.clone(), targets, config).unwrap();

  let report = r.run(RunMode::Full, &cancel).await.unwrap();
  assert!(report.cancelled);
  assert_eq!(report.statistics.targets_processed, 1);
  assert_eq!(report.statistics.flags_updated, 1);
  assert_eq!(fx.targets.write_count(), 1);
}

// ─── Reset, staleness, stamping ──────────────────────────────────────────────

#[tokio::test]
async fn reset_clears_stale_flags_before_matching() {
  let fx = Fixture::new();
  let wrong = Uuid::new_v4();
  for name in ["Unrelated Startup Co", "IBM"] {
    fx.targets
      .update_flag(fx.target(name).target_id, FlagUpdate::Matched(wrong), Utc::now())
      .await
      .unwrap();
  }

  let config = ReconConfig { reset_flags: true, ..Default::default() };
  let report = run(&fx.reconciler(config), RunMode::Full).await;

  assert_eq!(report.statistics.flags_removed, 2);
  assert_eq!(report.statistics.flags_updated, 3);

  let unrelated = fx.target("Unrelated Startup Co");
  assert!(!unrelated.is_sponsor);
  assert_eq!(unrelated.matched_sponsor, None);
  assert!(unrelated.flag_updated_at.is_some());

  let ibm = fx.target("IBM");
  assert_eq!(ibm.matched_sponsor, Some(fx.sponsor_id("International Business Machines")));
}

#[tokio::test]
async fn without_reset_unmatched_targets_keep_their_flag() {
  let fx = Fixture::new();
  let earlier = Uuid::new_v4();
  fx.targets
    .update_flag(fx.target("Unrelated Startup Co").target_id, FlagUpdate::Matched(earlier), Utc::now())
    .await
    .unwrap();

  run(&fx.reconciler(ReconConfig::default()), RunMode::Full).await;
  assert_eq!(fx.target("Unrelated Startup Co").matched_sponsor, Some(earlier));
}

fn evaluated(name: &str, at: DateTime<Utc>) -> TargetRecord {
  let mut t = TargetRecord::new(name);
  t.flag_updated_at = Some(at);
  t
}

#[tokio::test]
async fn incremental_run_only_takes_stale_targets() {
  let now = Utc::now();
  let fx = Fixture {
    targets: MemoryTargetStore::new([
      evaluated("ACME CORP.", now - Duration::days(1)),
      evaluated("IBM", now - Duration::days(45)),
      TargetRecord::new("Smith Associates"),
      evaluated("Unrelated Startup Co", now - Duration::days(90)),
    ]),
    ..Fixture::new()
  };

  let report = run(&fx.reconciler(ReconConfig::default()), RunMode::Incremental).await;
  assert_eq!(report.mode, RunMode::Incremental);
  assert_eq!(report.statistics.total_targets, 3);
  assert_eq!(report.statistics.matches_found, 2);
  assert!(!fx.target("ACME CORP.").is_sponsor);

  let limited = ReconConfig { stale_batch_size: 1, ..Default::default() };
  let fx = Fixture::new();
  let report = run(&fx.reconciler(limited), RunMode::Incremental).await;
  assert_eq!(report.statistics.total_targets, 1);
}

#[tokio::test]
async fn stamping_unmatched_targets_drains_the_stale_backlog() {
  let fx = Fixture::new();
  let config = ReconConfig { stamp_unmatched: true, ..Default::default() };
  let r = fx.reconciler(config);

  let first = run(&r, RunMode::Incremental).await;
  assert_eq!(first.statistics.total_targets, 5);
  assert_eq!(first.statistics.flags_updated, 4);

  let unrelated = fx.target("Unrelated Startup Co");
  assert!(!unrelated.is_sponsor);
  assert!(unrelated.flag_updated_at.is_some());

  // Only the unmatchable name is left.
  let second = run(&r, RunMode::Incremental).await;
  assert_eq!(second.statistics.total_targets, 1);
  assert_eq!(second.error_sample[0].target_name, "!!!");
}

// ─── Orphan cleanup ──────────────────────────────────────────────────────────

#[tokio::test]
async fn deactivated_sponsor_flags_are_cleared() {
  let fx = Fixture::new();
  fx.targets.insert(TargetRecord::new("Acme Corp"));
  let r = fx.reconciler(ReconConfig::default());
  run(&r, RunMode::Full).await;

  let acme = fx.sponsor_id("Acme Corporation");
  fx.sponsors.set_active(acme, false);

  let cleanup = r.cleanup_orphans(&CancelFlag::new()).await.unwrap();
  assert_eq!(cleanup.checked, 4);
  assert_eq!(cleanup.sponsors_verified, 3);
  assert_eq!(cleanup.orphans_found, 2);
  assert_eq!(cleanup.flags_removed, 2);
  assert_eq!(cleanup.errors, 0);

  for name in ["ACME CORP.", "Acme Corp"] {
    let t = fx.target(name);
    assert!(!t.is_sponsor);
    assert_eq!(t.matched_sponsor, None);
  }
  assert!(fx.target("IBM").is_sponsor);
}

#[tokio::test]
async fn deleted_sponsor_flags_are_cleared_after_run() {
  let fx = Fixture::new();
  let ghost = SponsorRecord::new("Ghost Holdings");
  let t = TargetRecord::new("Someone Else");
  fx.targets.insert(t.clone());
  fx.targets
    .update_flag(t.target_id, FlagUpdate::Matched(ghost.sponsor_id), Utc::now())
    .await
    .unwrap();

  let config = ReconConfig { cleanup_after_run: true, ..Default::default() };
  let report = run(&fx.reconciler(config), RunMode::Full).await;

  assert_eq!(report.statistics.flags_removed, 1);
  let cleanup = report.cleanup.expect("cleanup ran");
  assert_eq!(cleanup.orphans_found, 1);
  assert_eq!(cleanup.flags_removed, 1);
  assert!(report.timestamp >= cleanup.timestamp, "report is stamped when the run finishes");
  assert!(!fx.target("Someone Else").is_sponsor);
}

#[tokio::test]
async fn cleanup_with_unavailable_sponsors_is_fatal() {
  let fx = Fixture::new();
  let r = fx.reconciler(ReconConfig::default());
  run(&r, RunMode::Full).await;
  let writes = fx.targets.write_count();

  fx.sponsors.set_offline(true);
  let err = r.cleanup_orphans(&CancelFlag::new()).await.unwrap_err();
  assert!(matches!(err, Error::Unavailable { .. }));
  assert_eq!(fx.targets.write_count(), writes);
}

// ─── Reports & scheduling ────────────────────────────────────────────────────

#[tokio::test]
async fn report_file_is_written_when_configured() {
  let dir = tempfile::tempdir().unwrap();
  let fx = Fixture::new();
  let config = ReconConfig { report_dir: Some(dir.path().to_path_buf()), ..Default::default() };
  run(&fx.reconciler(config), RunMode::Full).await;

  let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
  assert_eq!(files.len(), 1);
  let name = files[0].as_ref().unwrap().file_name();
  assert!(name.to_string_lossy().starts_with("sponsor_match_report_"));
}

#[tokio::test]
async fn report_write_failure_does_not_fail_the_run() {
  let dir = tempfile::tempdir().unwrap();
  let blocker = dir.path().join("not-a-dir");
  std::fs::write(&blocker, b"").unwrap();

  let fx = Fixture::new();
  let config = ReconConfig { report_dir: Some(blocker), ..Default::default() };
  let report = run(&fx.reconciler(config), RunMode::Full).await;
  assert_eq!(report.statistics.matches_found, 3);
}

#[tokio::test]
async fn assessment_drives_the_scheduled_run() {
  let fx = Fixture::new();
  let r = fx.reconciler(ReconConfig::default());

  let before = r.assess().await.unwrap();
  assert_eq!(before.mode, Some(RunMode::Full));

  let report = r.run_if_due(&CancelFlag::new()).await.unwrap().expect("run was due");
  assert_eq!(report.mode, RunMode::Full);

  // Two targets were never evaluated, so an incremental run is still due.
  let after = r.assess().await.unwrap();
  assert_eq!(after.mode, Some(RunMode::Incremental));
}

// ─── SQLite end to end ───────────────────────────────────────────────────────

#[tokio::test]
async fn sqlite_stores_end_to_end() {
  let sponsors = SqliteSponsorStore::open_in_memory().await.unwrap();
  let targets = SqliteTargetStore::open_in_memory().await.unwrap();

  let directory = SPONSORS.map(SponsorRecord::new);
  for sponsor in &directory {
    sponsors.put_sponsor(sponsor).await.unwrap();
  }
  let mut added = Vec::new();
  for name in TARGETS {
    added.push(targets.add_target(name).await.unwrap());
  }

  let r = Reconciler::new(sponsors.clone(), targets.clone(), ReconConfig::default()).unwrap();
  let report = run(&r, RunMode::Full).await;
  assert_eq!(report.statistics.matches_found, 3);
  assert_eq!(report.statistics.errors, 1);

  let acme = targets.get_target(added[0].target_id).await.unwrap().unwrap();
  assert_eq!(acme.matched_sponsor, Some(directory[0].sponsor_id));
  let unrelated = targets.get_target(added[3].target_id).await.unwrap().unwrap();
  assert!(!unrelated.is_sponsor);

  assert!(sponsors.set_active(directory[0].sponsor_id, false).await.unwrap());
  let cleanup = r.cleanup_orphans(&CancelFlag::new()).await.unwrap();
  assert_eq!(cleanup.flags_removed, 1);

  let acme = targets.get_target(added[0].target_id).await.unwrap().unwrap();
  assert!(!acme.is_sponsor);
  assert_eq!(acme.matched_sponsor, None);

  let stats = targets.flag_stats().await.unwrap();
  assert_eq!(stats.flagged, 2);
}

#[tokio::test]
async fn malformed_sponsor_document_does_not_stop_the_run() {
  let sponsors = SqliteSponsorStore::open_in_memory().await.unwrap();
  let targets = SqliteTargetStore::open_in_memory().await.unwrap();

  let acme = SponsorRecord::new("Acme Corporation");
  sponsors.put_sponsor(&acme).await.unwrap();
  let globex = Uuid::new_v4();
  sponsors
    .put_document(
      globex,
      &serde_json::json!({ "name": "Globex", "active": true, "alternate_names": "Globex Intl" }),
    )
    .await
    .unwrap();
  let target = targets.add_target("ACME CORP.").await.unwrap();

  let r = Reconciler::new(sponsors, targets.clone(), ReconConfig::default()).unwrap();
  let report = run(&r, RunMode::Full).await;

  assert_eq!(report.statistics.total_sponsors, 1);
  assert_eq!(report.statistics.matches_found, 1);
  assert_eq!(report.statistics.errors, 1);
  assert_eq!(report.error_sample.len(), 1);
  assert!(report.error_sample[0].target_name.contains(&globex.to_string()));

  let t = targets.get_target(target.target_id).await.unwrap().unwrap();
  assert!(t.is_sponsor);
  assert_eq!(t.matched_sponsor, Some(acme.sponsor_id));
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

impl Fixture {
  fn sponsors_ids(&self) -> Vec<Uuid> {
    SPONSORS.iter().map(|name| self.sponsor_id(name)).collect()
  }
}

enum Hook {
  /// Every flag write fails as if the store went away after loading.
  OfflineWrites,
  /// Trip the cancel flag after each successful write.
  CancelOnWrite(CancelFlag),
}

/// Delegates to a [`MemoryTargetStore`], intercepting flag writes.
struct Hooked {
  inner: MemoryTargetStore,
  hook:  Hook,
}

impl TargetRepository for Hooked {
  type Error = MemoryError;

  async fn fetch_stale_targets(
    &self,
    staleness_days: u32,
    limit: usize,
  ) -> Result<Loaded<TargetRecord>, MemoryError> {
    self.inner.fetch_stale_targets(staleness_days, limit).await
  }

  async fn fetch_all_targets(&self) -> Result<Loaded<TargetRecord>, MemoryError> {
    self.inner.fetch_all_targets().await
  }

  async fn fetch_flagged_targets(&self) -> Result<Loaded<TargetRecord>, MemoryError> {
    self.inner.fetch_flagged_targets().await
  }

  async fn update_flag(
    &self,
    id: Uuid,
    update: FlagUpdate,
    at: DateTime<Utc>,
  ) -> Result<(), MemoryError> {
    match &self.hook {
      Hook::OfflineWrites => Err(MemoryError::Unavailable),
      Hook::CancelOnWrite(cancel) => {
        self.inner.update_flag(id, update, at).await?;
        cancel.cancel();
        Ok(())
      }
    }
  }

  async fn bulk_reset_flags(
    &self,
    ids: Vec<Uuid>,
    at: DateTime<Utc>,
  ) -> Result<u64, MemoryError> {
    self.inner.bulk_reset_flags(ids, at).await
  }

  async fn flag_stats(&self) -> Result<FlagStats, MemoryError> {
    self.inner.flag_stats().await
  }
}
