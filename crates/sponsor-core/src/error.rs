//! Error types for `sponsor-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("similarity threshold must be within [0, 1], got {0}")]
  InvalidThreshold(f64),

  #[error("name has no matchable content: {0:?}")]
  BlankName(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
