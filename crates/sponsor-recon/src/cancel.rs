//! Cooperative cancellation for long runs.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

/// A shared flag checked between target iterations.
///
/// Cloning is cheap and clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
  pub fn new() -> Self { Self::default() }

  pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }

  pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}
