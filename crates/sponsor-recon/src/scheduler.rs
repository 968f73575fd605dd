//! When should a reconciliation run happen, and which kind?
//!
//! [`assess`] is pure: it looks at aggregate directory statistics and a
//! policy and explains whether maintenance is due.
//! [`Reconciler::assess`](crate::Reconciler::assess) gathers the statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sponsor_core::record::FlagStats;

use crate::job::RunMode;

/// Thresholds that trigger maintenance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulePolicy {
  /// Days since the most recent flag update after which flags are stale.
  pub stale_after_days: i64,
  /// Flagged / total below this is suspicious for a large directory.
  pub low_match_rate:   f64,
  /// Active sponsor count from which a directory counts as large.
  pub large_directory:  u64,
}

impl Default for SchedulePolicy {
  fn default() -> Self {
    Self { stale_after_days: 30, low_match_rate: 0.05, large_directory: 1000 }
  }
}

/// Aggregate counts from both stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryStats {
  pub active_sponsors: u64,
  pub targets:         FlagStats,
}

/// Why maintenance is due.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MaintenanceReason {
  StaleFlags { days_since_update: i64 },
  NeverUpdated { count: u64 },
  NoFlaggedTargets { active_sponsors: u64 },
  LowMatchRate { match_rate: f64, active_sponsors: u64 },
}

impl MaintenanceReason {
  /// Reasons that call for re-evaluating every target.
  fn wants_full_run(&self) -> bool {
    matches!(self, Self::NoFlaggedTargets { .. } | Self::LowMatchRate { .. })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceDecision {
  pub run_recommended: bool,
  pub mode:            Option<RunMode>,
  pub reasons:         Vec<MaintenanceReason>,
}

pub fn assess(
  stats: &DirectoryStats,
  now: DateTime<Utc>,
  policy: &SchedulePolicy,
) -> MaintenanceDecision {
  let mut reasons = Vec::new();
  let targets = &stats.targets;

  if let Some(last) = targets.last_updated_at {
    let days = (now - last).num_days();
    if days >= policy.stale_after_days {
      reasons.push(MaintenanceReason::StaleFlags { days_since_update: days });
    }
  }

  if targets.never_updated > 0 {
    reasons.push(MaintenanceReason::NeverUpdated { count: targets.never_updated });
  }

  if stats.active_sponsors > 0 && targets.total > 0 && targets.flagged == 0 {
    reasons.push(MaintenanceReason::NoFlaggedTargets {
      active_sponsors: stats.active_sponsors,
    });
  } else if targets.total > 0 && stats.active_sponsors >= policy.large_directory {
    let match_rate = targets.flagged as f64 / targets.total as f64;
    if match_rate < policy.low_match_rate {
      reasons.push(MaintenanceReason::LowMatchRate {
        match_rate,
        active_sponsors: stats.active_sponsors,
      });
    }
  }

  let mode = if reasons.is_empty() {
    None
  } else if reasons.iter().any(MaintenanceReason::wants_full_run) {
    Some(RunMode::Full)
  } else {
    Some(RunMode::Incremental)
  };

  MaintenanceDecision { run_recommended: mode.is_some(), mode, reasons }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;

  fn stats(active: u64, total: u64, flagged: u64, never: u64, days_ago: Option<i64>) -> DirectoryStats {
    let now = Utc::now();
    DirectoryStats {
      active_sponsors: active,
      targets:         FlagStats {
        total,
        flagged,
        never_updated: never,
        last_updated_at: days_ago.map(|d| now - Duration::days(d)),
      },
    }
  }

  #[test]
  fn healthy_directory_needs_nothing() {
    let decision = assess(&stats(50, 100, 20, 0, Some(1)), Utc::now(), &SchedulePolicy::default());
    assert!(!decision.run_recommended);
    assert_eq!(decision.mode, None);
    assert!(decision.reasons.is_empty());
  }

  #[test]
  fn old_flags_recommend_incremental() {
    let decision = assess(&stats(50, 100, 20, 0, Some(45)), Utc::now(), &SchedulePolicy::default());
    assert_eq!(decision.mode, Some(RunMode::Incremental));
    assert!(matches!(
      decision.reasons[..],
      [MaintenanceReason::StaleFlags { days_since_update }] if days_since_update >= 44
    ));
  }

  #[test]
  fn never_updated_targets_recommend_incremental() {
    let decision = assess(&stats(50, 100, 20, 3, Some(1)), Utc::now(), &SchedulePolicy::default());
    assert_eq!(decision.mode, Some(RunMode::Incremental));
    assert_eq!(decision.reasons, [MaintenanceReason::NeverUpdated { count: 3 }]);
  }

  #[test]
  fn no_flagged_targets_recommend_full() {
    let decision = assess(&stats(50, 100, 0, 0, Some(1)), Utc::now(), &SchedulePolicy::default());
    assert_eq!(decision.mode, Some(RunMode::Full));
    assert_eq!(
      decision.reasons,
      [MaintenanceReason::NoFlaggedTargets { active_sponsors: 50 }]
    );
  }

  #[test]
  fn low_match_rate_only_counts_for_large_directories() {
    let policy = SchedulePolicy::default();

    let small = assess(&stats(999, 1000, 10, 0, Some(1)), Utc::now(), &policy);
    assert!(!small.run_recommended);

    let large = assess(&stats(1000, 1000, 10, 0, Some(1)), Utc::now(), &policy);
    assert_eq!(large.mode, Some(RunMode::Full));
    assert!(matches!(
      large.reasons[..],
      [MaintenanceReason::LowMatchRate { active_sponsors: 1000, .. }]
    ));
  }

  #[test]
  fn empty_target_store_is_left_alone() {
    let decision = assess(&stats(50, 0, 0, 0, None), Utc::now(), &SchedulePolicy::default());
    assert!(!decision.run_recommended);
  }
}
