//! Run and cleanup reports.
//!
//! Reports are built once at the end of a run and never mutated afterwards.
//! They serialise to camelCase JSON and can be written to a timestamped file
//! in a configured directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, job::RunMode, scheduler::SchedulePolicy};

// ─── Report types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatistics {
  pub total_sponsors:    u64,
  pub total_targets:     u64,
  pub targets_processed: u64,
  pub matches_found:     u64,
  /// Successful flag writes during matching.
  pub flags_updated:     u64,
  /// Flags cleared by a pre-run reset or by orphan cleanup after the run.
  pub flags_removed:     u64,
  /// Per-record failures, including stored records that could not be decoded.
  pub errors:            u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopMatch {
  pub target_name:        String,
  pub sponsor_name:       String,
  /// Score scaled to 0..=100, one decimal place.
  pub similarity_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSample {
  pub target_name:   String,
  pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
  pub timestamp:       DateTime<Utc>,
  pub mode:            RunMode,
  pub cancelled:       bool,
  pub statistics:      RunStatistics,
  pub top_matches:     Vec<TopMatch>,
  pub error_sample:    Vec<ErrorSample>,
  pub recommendations: Vec<String>,
  /// Present when orphan cleanup ran after the reconciliation run.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cleanup:         Option<CleanupReport>,
}

/// Outcome of an orphan-cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
  pub timestamp:         DateTime<Utc>,
  pub cancelled:         bool,
  /// Flagged targets with a reference that were examined.
  pub checked:           u64,
  /// Distinct sponsor ids looked up.
  pub sponsors_verified: u64,
  /// Targets whose reference no longer resolves to an active sponsor.
  pub orphans_found:     u64,
  pub flags_removed:     u64,
  pub errors:            u64,
  pub error_sample:      Vec<ErrorSample>,
}

// ─── Building ────────────────────────────────────────────────────────────────

/// Percent with one decimal place.
pub fn to_percent(score: f64) -> f64 { (score * 1000.0).round() / 10.0 }

/// Accumulates per-target outcomes for a [`RunReport`].
///
/// Keeps at most `sample_size` top matches (highest score first, earlier
/// matches winning ties) and the first `sample_size` errors.
#[derive(Debug)]
pub struct ReportBuilder {
  sample_size: usize,
  stats:       RunStatistics,
  top:         Vec<(f64, TopMatch)>,
  errors:      Vec<ErrorSample>,
}

impl ReportBuilder {
  pub fn new(sample_size: usize) -> Self {
    Self {
      sample_size,
      stats: RunStatistics::default(),
      top: Vec::with_capacity(sample_size + 1),
      errors: Vec::with_capacity(sample_size),
    }
  }

  pub fn set_totals(&mut self, sponsors: usize, targets: usize) {
    self.stats.total_sponsors = sponsors as u64;
    self.stats.total_targets = targets as u64;
  }

  pub fn processed(&mut self) { self.stats.targets_processed += 1; }

  pub fn flags_updated(&mut self, n: u64) { self.stats.flags_updated += n; }

  pub fn flags_removed(&mut self, n: u64) { self.stats.flags_removed += n; }

  pub fn record_match(&mut self, target_name: &str, sponsor_name: &str, score: f64) {
    self.stats.matches_found += 1;
    if self.sample_size == 0 {
      return;
    }
    if self.top.len() == self.sample_size
      && self.top.last().is_some_and(|(lowest, _)| score <= *lowest)
    {
      return;
    }
    let at = self.top.partition_point(|(s, _)| *s >= score);
    self.top.insert(at, (score, TopMatch {
      target_name:        target_name.to_owned(),
      sponsor_name:       sponsor_name.to_owned(),
      similarity_percent: to_percent(score),
    }));
    self.top.truncate(self.sample_size);
  }

  pub fn record_error(&mut self, target_name: &str, message: impl ToString) {
    self.stats.errors += 1;
    push_sample(&mut self.errors, self.sample_size, target_name, message);
  }

  pub fn stats(&self) -> &RunStatistics { &self.stats }

  pub fn finish(
    self,
    timestamp: DateTime<Utc>,
    mode: RunMode,
    cancelled: bool,
    policy: &SchedulePolicy,
  ) -> RunReport {
    let recommendations = recommendations(&self.stats, cancelled, policy);
    RunReport {
      timestamp,
      mode,
      cancelled,
      statistics: self.stats,
      top_matches: self.top.into_iter().map(|(_, m)| m).collect(),
      error_sample: self.errors,
      recommendations,
      cleanup: None,
    }
  }
}

/// Append to a bounded error sample, counting nothing.
pub fn push_sample(
  sample: &mut Vec<ErrorSample>,
  bound: usize,
  target_name: &str,
  message: impl ToString,
) {
  if sample.len() < bound {
    sample.push(ErrorSample {
      target_name:   target_name.to_owned(),
      error_message: message.to_string(),
    });
  }
}

/// Operator-facing advice derived from run statistics.
pub fn recommendations(
  stats: &RunStatistics,
  cancelled: bool,
  policy: &SchedulePolicy,
) -> Vec<String> {
  let mut out = Vec::new();

  if cancelled {
    out.push(format!(
      "Run was cancelled after {} of {} targets; run again to finish the remainder.",
      stats.targets_processed, stats.total_targets
    ));
  }

  if stats.errors > 0 {
    out.push(format!(
      "{} targets could not be reconciled; see errorSample for details.",
      stats.errors
    ));
  }

  if stats.targets_processed > 0 && stats.matches_found == 0 {
    out.push(
      "No matches were found; check that the sponsor directory is current and \
       that the similarity threshold is not too strict."
        .to_owned(),
    );
  } else if stats.targets_processed > 0 && stats.total_sponsors >= policy.large_directory {
    let rate = stats.matches_found as f64 / stats.targets_processed as f64;
    if rate < policy.low_match_rate {
      out.push(format!(
        "Match rate is {:.1}% against {} active sponsors; consider lowering the \
         similarity threshold or enabling alternate names.",
        rate * 100.0,
        stats.total_sponsors
      ));
    }
  }

  out
}

// ─── Files ───────────────────────────────────────────────────────────────────

pub fn report_file_name(timestamp: DateTime<Utc>) -> String {
  format!("sponsor_match_report_{}.json", timestamp.format("%Y%m%d_%H%M%S"))
}

/// Write `report` as pretty JSON into `dir`, creating it if needed.
pub async fn write_report(report: &RunReport, dir: &Path) -> Result<PathBuf> {
  let body = serde_json::to_vec_pretty(report)?;
  tokio::fs::create_dir_all(dir).await?;
  let path = dir.join(report_file_name(report.timestamp));
  tokio::fs::write(&path, body).await?;
  Ok(path)
}
