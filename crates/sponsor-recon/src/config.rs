//! Run configuration.
//!
//! Every operational knob of the job lives here; nothing in [`crate::job`] is
//! hard-coded. Deserialised from the `[recon]` table of the binary's config
//! file, with every field optional.

use std::path::PathBuf;

use serde::Deserialize;
use sponsor_core::matcher::{DEFAULT_THRESHOLD, Matcher};

use crate::{Error, Result, scheduler::SchedulePolicy};

/// How candidates are retrieved for each target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
  /// Only sponsors sharing an exact variant with the target are scored.
  #[default]
  Indexed,
  /// Every sponsor is scored against every target.
  FullScan,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
  pub similarity_threshold: f64,
  /// Targets whose flag is older than this are stale.
  pub staleness_days:       u32,
  /// Maximum targets taken by an incremental run.
  pub stale_batch_size:     usize,
  /// Targets matched before each persistence phase.
  pub chunk_size:           usize,
  /// Flag writes in flight at once within a chunk.
  pub persist_concurrency:  usize,
  /// Log a checkpoint every this many targets. Zero disables checkpoints.
  pub log_every:            usize,
  /// Bound on `topMatches` and `errorSample`.
  pub report_sample_size:   usize,
  /// Clear every loaded target's flag before matching.
  pub reset_flags:          bool,
  /// Write a cleared flag with a fresh timestamp for unmatched, unflagged
  /// targets.
  pub stamp_unmatched:      bool,
  /// Run orphan cleanup after every reconciliation run.
  pub cleanup_after_run:    bool,
  pub strategy:             MatchStrategy,
  /// Index and score alternate sponsor names too.
  pub include_aliases:      bool,
  /// Where to write report files. `None` disables report files.
  pub report_dir:           Option<PathBuf>,
  pub schedule:             SchedulePolicy,
}

impl Default for ReconConfig {
  fn default() -> Self {
    Self {
      similarity_threshold: DEFAULT_THRESHOLD,
      staleness_days:       30,
      stale_batch_size:     1000,
      chunk_size:           100,
      persist_concurrency:  1,
      log_every:            100,
      report_sample_size:   10,
      reset_flags:          false,
      stamp_unmatched:      false,
      cleanup_after_run:    false,
      strategy:             MatchStrategy::Indexed,
      include_aliases:      false,
      report_dir:           None,
      schedule:             SchedulePolicy::default(),
    }
  }
}

impl ReconConfig {
  pub fn validate(&self) -> Result<()> {
    if !(0.0..=1.0).contains(&self.similarity_threshold) {
      return Err(Error::InvalidConfig(format!(
        "similarity_threshold must be within [0, 1], got {}",
        self.similarity_threshold
      )));
    }
    if self.chunk_size == 0 {
      return Err(Error::InvalidConfig("chunk_size must be at least 1".into()));
    }
    if self.persist_concurrency == 0 {
      return Err(Error::InvalidConfig(
        "persist_concurrency must be at least 1".into(),
      ));
    }
    if self.stale_batch_size == 0 {
      return Err(Error::InvalidConfig(
        "stale_batch_size must be at least 1".into(),
      ));
    }
    if !(0.0..=1.0).contains(&self.schedule.low_match_rate) {
      return Err(Error::InvalidConfig(format!(
        "schedule.low_match_rate must be within [0, 1], got {}",
        self.schedule.low_match_rate
      )));
    }
    Ok(())
  }

  /// The matcher this configuration describes.
  pub fn matcher(&self) -> Result<Matcher> {
    Ok(Matcher::new(self.similarity_threshold)?.with_aliases(self.include_aliases))
  }
}

/// Top-level configuration of the `sponsor-recon` binary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  /// SQLite file holding the `employers` table.
  pub target_db:  PathBuf,
  /// SQLite file holding the `sponsor_documents` table.
  pub sponsor_db: PathBuf,
  pub recon:      ReconConfig,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      target_db:  PathBuf::from("employers.db"),
      sponsor_db: PathBuf::from("sponsors.db"),
      recon:      ReconConfig::default(),
    }
  }
}
