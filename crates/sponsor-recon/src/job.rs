//! The reconciliation job.
//!
//! A run loads the active sponsors and a slice of targets, builds a
//! [`LookupIndex`], then alternates between matching a chunk of targets and
//! persisting that chunk's flag writes. Fatal conditions (nothing to
//! reconcile, an unavailable store) end the run with an [`Error`]; anything
//! scoped to one target is counted, logged and sampled into the
//! [`RunReport`] while the run carries on.

use std::{collections::HashMap, fmt, pin::pin};

use chrono::Utc;
use futures::{StreamExt as _, stream};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sponsor_core::{
  index::{IndexOptions, LookupIndex},
  matcher::{MatchResult, Matcher},
  normalize::normalize,
  record::{FlagUpdate, TargetRecord},
  store::{SkippedRecord, SponsorRepository, StoreError as _, TargetRepository},
};

use crate::{
  CancelFlag, Error, Result,
  config::{MatchStrategy, ReconConfig},
  phase::{PhaseTracker, RunPhase},
  report::{CleanupReport, ReportBuilder, RunReport, push_sample, write_report},
  scheduler::{self, DirectoryStats, MaintenanceDecision},
};

/// Count records the store could not decode as run errors.
fn record_skipped(report: &mut ReportBuilder, kind: &str, skipped: &[SkippedRecord]) {
  for record in skipped {
    report.record_error(&format!("{kind} {}", record.id), &record.reason);
  }
}

/// Which targets a run evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
  /// Every target in the store.
  Full,
  /// Never-evaluated and stale targets, oldest first, up to the batch size.
  Incremental,
}

impl fmt::Display for RunMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Full => "full",
      Self::Incremental => "incremental",
    })
  }
}

/// What happened to one target during matching.
enum Outcome<'a> {
  Matched(MatchResult<'a>),
  Unmatched,
  Failed(sponsor_core::Error),
}

/// Runs reconciliation, orphan cleanup and maintenance assessment against a
/// sponsor directory `S` and a target store `T`.
pub struct Reconciler<S, T> {
  sponsors: S,
  targets:  T,
  config:   ReconConfig,
}

impl<S, T> Reconciler<S, T>
where
  S: SponsorRepository,
  T: TargetRepository,
{
  /// Returns [`Error::InvalidConfig`] if `config` does not validate.
  pub fn new(sponsors: S, targets: T, config: ReconConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { sponsors, targets, config })
  }

  pub fn config(&self) -> &ReconConfig { &self.config }

  pub fn sponsors(&self) -> &S { &self.sponsors }

  pub fn targets(&self) -> &T { &self.targets }

  // ─── Reconciliation ────────────────────────────────────────────────────────

  /// Run one reconciliation pass.
  ///
  /// Setting `cancel` stops the run before the next target; flags for the
  /// targets already matched are still written and the returned report has
  /// `cancelled: true`.
  pub async fn run(&self, mode: RunMode, cancel: &CancelFlag) -> Result<RunReport> {
    let mut phase = PhaseTracker::default();
    match self.run_phases(mode, cancel, &mut phase).await {
      Ok(report) => Ok(report),
      Err(e) => {
        phase.fail(&e);
        Err(e)
      }
    }
  }

  async fn run_phases(
    &self,
    mode: RunMode,
    cancel: &CancelFlag,
    phase: &mut PhaseTracker,
  ) -> Result<RunReport> {
    let matcher = self.config.matcher()?;
    let mut report = ReportBuilder::new(self.config.report_sample_size);

    // Loading
    phase.advance(RunPhase::Loading)?;
    tracing::info!(%mode, "loading sponsors and targets");

    let sponsors = self
      .sponsors
      .fetch_active_sponsors()
      .await
      .map_err(|e| Error::store("loading sponsors", e))?;
    record_skipped(&mut report, "sponsor document", &sponsors.skipped);
    let sponsors = sponsors.records;
    if sponsors.is_empty() {
      return Err(Error::NoSponsors);
    }

    let targets = match mode {
      RunMode::Full => self.targets.fetch_all_targets().await,
      RunMode::Incremental => {
        self
          .targets
          .fetch_stale_targets(self.config.staleness_days, self.config.stale_batch_size)
          .await
      }
    }
    .map_err(|e| Error::store("loading targets", e))?;
    record_skipped(&mut report, "employer", &targets.skipped);
    let mut targets = targets.records;
    if targets.is_empty() {
      return Err(Error::NoTargets);
    }

    // Indexing
    phase.advance(RunPhase::Indexing)?;
    let index = LookupIndex::build_with(sponsors, IndexOptions {
      include_aliases: self.config.include_aliases,
    });
    tracing::info!(
      sponsors = index.len(),
      variants = index.variant_count(),
      targets = targets.len(),
      strategy = ?self.config.strategy,
      "lookup index built"
    );

    report.set_totals(index.len(), targets.len());

    if self.config.reset_flags {
      phase.advance(RunPhase::Persisting)?;
      let removed = self.reset_flags(&mut targets).await?;
      report.flags_removed(removed);
    }

    // Matching ⇄ Persisting
    let mut cancelled = false;
    for chunk in targets.chunks(self.config.chunk_size) {
      if cancel.is_cancelled() {
        cancelled = true;
        break;
      }

      phase.advance(RunPhase::Matching)?;
      let mut outcomes = Vec::with_capacity(chunk.len());
      for target in chunk {
        if cancel.is_cancelled() {
          cancelled = true;
          break;
        }
        let outcome = self.evaluate(&matcher, &index, target);
        match &outcome {
          Outcome::Matched(m) => {
            tracing::debug!(
              target = %target.name,
              sponsor = %m.sponsor.name,
              score = m.score,
              "matched"
            );
            report.record_match(&target.name, &m.sponsor.name, m.score);
          }
          Outcome::Unmatched => {}
          Outcome::Failed(e) => {
            tracing::warn!(target_id = %target.target_id, error = %e, "cannot match target");
            report.record_error(&target.name, e);
          }
        }
        report.processed();
        outcomes.push((target, outcome));
        self.checkpoint(&report);
      }

      phase.advance(RunPhase::Persisting)?;
      self.persist(&outcomes, &mut report).await?;

      if cancelled {
        break;
      }
    }

    if cancelled {
      tracing::info!(
        processed = report.stats().targets_processed,
        total = report.stats().total_targets,
        "run cancelled"
      );
    }

    let cleanup = if self.config.cleanup_after_run && !cancelled {
      Some(self.cleanup_orphans(cancel).await?)
    } else {
      None
    };

    // Reporting
    phase.advance(RunPhase::Reporting)?;
    if let Some(cleanup) = &cleanup {
      report.flags_removed(cleanup.flags_removed);
    }
    let mut run_report = report.finish(Utc::now(), mode, cancelled, &self.config.schedule);
    run_report.cleanup = cleanup;

    if let Some(dir) = &self.config.report_dir {
      match write_report(&run_report, dir).await {
        Ok(path) => tracing::info!(path = %path.display(), "report written"),
        Err(e) => tracing::warn!(error = %e, "failed to write report"),
      }
    }

    phase.advance(RunPhase::Done)?;
    let stats = &run_report.statistics;
    tracing::info!(
      %mode,
      processed = stats.targets_processed,
      matches = stats.matches_found,
      updated = stats.flags_updated,
      removed = stats.flags_removed,
      errors = stats.errors,
      cancelled,
      "run complete"
    );

    Ok(run_report)
  }

  /// Clear the flag of every loaded target. Returns how many were flagged.
  async fn reset_flags(&self, targets: &mut [TargetRecord]) -> Result<u64> {
    let now = Utc::now();
    let ids: Vec<Uuid> = targets.iter().map(|t| t.target_id).collect();
    let flagged = targets.iter().filter(|t| t.is_sponsor).count() as u64;

    let written = self
      .targets
      .bulk_reset_flags(ids, now)
      .await
      .map_err(|e| Error::store("resetting flags", e))?;

    for target in targets.iter_mut() {
      target.apply(FlagUpdate::Cleared, now);
    }
    tracing::info!(written, flagged, "flags reset before matching");
    Ok(flagged)
  }

  fn evaluate<'a>(
    &self,
    matcher: &Matcher,
    index: &'a LookupIndex,
    target: &TargetRecord,
  ) -> Outcome<'a> {
    if normalize(&target.name).is_empty() {
      return Outcome::Failed(sponsor_core::Error::BlankName(target.name.clone()));
    }

    let best = match self.config.strategy {
      MatchStrategy::Indexed => matcher.find_best_match(&target.name, index.query(&target.name)),
      MatchStrategy::FullScan => matcher.find_best_match(&target.name, index.sponsors()),
    };

    match best {
      Some(m) => Outcome::Matched(m),
      None => Outcome::Unmatched,
    }
  }

  fn checkpoint(&self, report: &ReportBuilder) {
    let every = self.config.log_every as u64;
    let stats = report.stats();
    if every > 0 && stats.targets_processed % every == 0 {
      tracing::info!(
        processed = stats.targets_processed,
        total = stats.total_targets,
        matches = stats.matches_found,
        errors = stats.errors,
        "checkpoint"
      );
    }
  }

  /// Write the flag updates for one chunk.
  ///
  /// Per-record failures are counted; an unavailable store aborts the run and
  /// drops any writes still in flight.
  async fn persist(
    &self,
    outcomes: &[(&TargetRecord, Outcome<'_>)],
    report: &mut ReportBuilder,
  ) -> Result<()> {
    let now = Utc::now();
    let stamp_unmatched = self.config.stamp_unmatched;

    let writes: Vec<(&TargetRecord, FlagUpdate)> = outcomes
      .iter()
      .filter_map(|(target, outcome)| match outcome {
        Outcome::Matched(m) => Some((*target, FlagUpdate::Matched(m.sponsor.sponsor_id))),
        Outcome::Unmatched if stamp_unmatched && !target.is_sponsor => {
          Some((*target, FlagUpdate::Cleared))
        }
        _ => None,
      })
      .collect();

    let mut results = pin!(
      stream::iter(writes)
        .map(|(target, update)| async move {
          let result = self.targets.update_flag(target.target_id, update, now).await;
          (target, result)
        })
        .buffer_unordered(self.config.persist_concurrency.max(1))
    );

    while let Some((target, result)) = results.next().await {
      match result {
        Ok(()) => report.flags_updated(1),
        Err(e) if e.is_unavailable() => return Err(Error::store("persisting flags", e)),
        Err(e) => {
          tracing::warn!(target_id = %target.target_id, error = %e, "flag write failed");
          report.record_error(&target.name, &e);
        }
      }
    }
    Ok(())
  }

  // ─── Orphan cleanup ────────────────────────────────────────────────────────

  /// Clear every flag whose sponsor reference no longer resolves to an
  /// active sponsor.
  ///
  /// Each distinct sponsor id is looked up once.
  pub async fn cleanup_orphans(&self, cancel: &CancelFlag) -> Result<CleanupReport> {
    let mut report = CleanupReport { timestamp: Utc::now(), ..Default::default() };
    let sample_size = self.config.report_sample_size;

    let flagged = self
      .targets
      .fetch_flagged_targets()
      .await
      .map_err(|e| Error::store("loading flagged targets", e))?;
    for skipped in &flagged.skipped {
      report.errors += 1;
      push_sample(
        &mut report.error_sample,
        sample_size,
        &format!("employer {}", skipped.id),
        &skipped.reason,
      );
    }
    let flagged = flagged.records;
    tracing::info!(flagged = flagged.len(), "checking sponsor references");

    let mut verdicts: HashMap<Uuid, bool> = HashMap::new();

    for target in &flagged {
      if cancel.is_cancelled() {
        report.cancelled = true;
        break;
      }
      let Some(sponsor_id) = target.matched_sponsor else {
        continue;
      };
      report.checked += 1;

      let valid = match verdicts.get(&sponsor_id).copied() {
        Some(valid) => valid,
        None => match self.sponsors.get_sponsor(sponsor_id).await {
          Ok(sponsor) => {
            let valid = sponsor.is_some_and(|s| s.active);
            report.sponsors_verified += 1;
            verdicts.insert(sponsor_id, valid);
            valid
          }
          Err(e) if e.is_unavailable() => {
            return Err(Error::store("verifying sponsors", e));
          }
          Err(e) => {
            tracing::warn!(%sponsor_id, error = %e, "sponsor lookup failed");
            report.errors += 1;
            push_sample(&mut report.error_sample, sample_size, &target.name, &e);
            continue;
          }
        },
      };
      if valid {
        continue;
      }

      report.orphans_found += 1;
      tracing::debug!(target = %target.name, %sponsor_id, "orphaned flag");
      match self
        .targets
        .update_flag(target.target_id, FlagUpdate::Cleared, Utc::now())
        .await
      {
        Ok(()) => report.flags_removed += 1,
        Err(e) if e.is_unavailable() => {
          return Err(Error::store("clearing orphaned flags", e));
        }
        Err(e) => {
          tracing::warn!(target_id = %target.target_id, error = %e, "flag write failed");
          report.errors += 1;
          push_sample(&mut report.error_sample, sample_size, &target.name, &e);
        }
      }
    }

    tracing::info!(
      checked = report.checked,
      verified = report.sponsors_verified,
      orphans = report.orphans_found,
      removed = report.flags_removed,
      errors = report.errors,
      cancelled = report.cancelled,
      "orphan cleanup complete"
    );
    Ok(report)
  }

  // ─── Scheduling ────────────────────────────────────────────────────────────

  /// Gather directory statistics and decide whether a run is due.
  pub async fn assess(&self) -> Result<MaintenanceDecision> {
    let active_sponsors = self
      .sponsors
      .count_active()
      .await
      .map_err(|e| Error::store("counting sponsors", e))?;
    let targets = self
      .targets
      .flag_stats()
      .await
      .map_err(|e| Error::store("gathering flag statistics", e))?;

    let stats = DirectoryStats { active_sponsors, targets };
    let decision = scheduler::assess(&stats, Utc::now(), &self.config.schedule);
    tracing::info!(
      run_recommended = decision.run_recommended,
      mode = ?decision.mode,
      reasons = ?decision.reasons,
      "maintenance assessed"
    );
    Ok(decision)
  }

  /// Run in the recommended mode if [`assess`](Self::assess) says a run is
  /// due. Returns `None` when nothing was done.
  pub async fn run_if_due(&self, cancel: &CancelFlag) -> Result<Option<RunReport>> {
    match self.assess().await?.mode {
      Some(mode) => Ok(Some(self.run(mode, cancel).await?)),
      None => Ok(None),
    }
  }
}
