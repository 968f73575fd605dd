//! Run phases and the legal transitions between them.

use std::fmt;

use serde::Serialize;

use crate::{Error, Result};

/// Where a reconciliation run is.
///
/// `Matching` and `Persisting` alternate once per chunk. `Persisting` may also
/// follow `Indexing` directly when flags are reset before matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
  Idle,
  Loading,
  Indexing,
  Matching,
  Persisting,
  Reporting,
  Done,
  Failed,
}

impl RunPhase {
  pub fn is_terminal(self) -> bool { matches!(self, Self::Done | Self::Failed) }

  pub fn can_advance_to(self, next: RunPhase) -> bool {
    use RunPhase::*;
    match (self, next) {
      (Done | Failed, _) => false,
      (_, Failed) => true,
      (Idle, Loading)
      | (Loading, Indexing)
      | (Indexing, Matching | Persisting | Reporting)
      | (Matching, Persisting)
      | (Persisting, Matching | Reporting)
      | (Reporting, Done) => true,
      _ => false,
    }
  }
}

impl fmt::Display for RunPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Idle => "idle",
      Self::Loading => "loading",
      Self::Indexing => "indexing",
      Self::Matching => "matching",
      Self::Persisting => "persisting",
      Self::Reporting => "reporting",
      Self::Done => "done",
      Self::Failed => "failed",
    };
    f.write_str(s)
  }
}

/// Tracks the current phase of one run and logs every transition.
#[derive(Debug)]
pub struct PhaseTracker {
  current: RunPhase,
}

impl Default for PhaseTracker {
  fn default() -> Self { Self { current: RunPhase::Idle } }
}

impl PhaseTracker {
  pub fn current(&self) -> RunPhase { self.current }

  pub fn advance(&mut self, next: RunPhase) -> Result<()> {
    if self.current == next {
      return Ok(());
    }
    if !self.current.can_advance_to(next) {
      return Err(Error::InvalidTransition { from: self.current, to: next });
    }
    tracing::info!(from = %self.current, to = %next, "phase transition");
    self.current = next;
    Ok(())
  }

  /// Move to `Failed` from any non-terminal phase.
  pub fn fail(&mut self, error: &Error) {
    if !self.current.is_terminal() {
      tracing::error!(phase = %self.current, %error, "run failed");
      self.current = RunPhase::Failed;
    }
  }
}
