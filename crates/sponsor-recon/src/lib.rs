//! Batch reconciliation of employer records against the sponsor directory.
//!
//! [`Reconciler`] drives full and incremental runs over any
//! [`SponsorRepository`](sponsor_core::store::SponsorRepository) /
//! [`TargetRepository`](sponsor_core::store::TargetRepository) pair: it loads
//! both sides, builds a lookup index, matches and persists flags, repairs
//! orphaned references and reports. The [`scheduler`] decides when a run is
//! due.

pub mod cancel;
pub mod config;
pub mod error;
pub mod job;
pub mod phase;
pub mod report;
pub mod scheduler;

pub use cancel::CancelFlag;
pub use config::{AppConfig, MatchStrategy, ReconConfig};
pub use error::{Error, Result};
pub use job::{Reconciler, RunMode};
pub use report::{CleanupReport, RunReport};

#[cfg(test)]
mod tests;
