//! Error type for `sponsor-recon`.
//!
//! Every variant returned from a run is fatal: the run stopped and nothing
//! further was written. Per-record failures never surface here; they are
//! counted and sampled into the report instead.

use sponsor_core::store::StoreError;
use thiserror::Error;

use crate::phase::RunPhase;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("sponsor directory has no active sponsors")]
  NoSponsors,

  #[error("no target records to reconcile")]
  NoTargets,

  #[error("store unavailable while {stage}: {source}")]
  Unavailable {
    stage:  &'static str,
    #[source]
    source: BoxError,
  },

  #[error("store error while {stage}: {source}")]
  Store {
    stage:  &'static str,
    #[source]
    source: BoxError,
  },

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("illegal phase transition {from} -> {to}")]
  InvalidTransition { from: RunPhase, to: RunPhase },

  #[error("failed to write report: {0}")]
  Report(#[from] std::io::Error),

  #[error("failed to serialise report: {0}")]
  ReportJson(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a repository error, keeping the unavailable/other distinction.
  pub fn store<E: StoreError>(stage: &'static str, e: E) -> Self {
    if e.is_unavailable() {
      Error::Unavailable { stage, source: Box::new(e) }
    } else {
      Error::Store { stage, source: Box::new(e) }
    }
  }
}

impl From<sponsor_core::Error> for Error {
  fn from(e: sponsor_core::Error) -> Self { Error::InvalidConfig(e.to_string()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
