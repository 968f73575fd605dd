//! Error type for `sponsor-store-sqlite`.

use rusqlite::ErrorCode;
use sponsor_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("malformed sponsor document {0}: {1}")]
  MalformedDocument(uuid::Uuid, String),

  #[error("target not found: {0}")]
  TargetNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl StoreError for Error {
  fn is_unavailable(&self) -> bool {
    match self {
      Error::Database(tokio_rusqlite::Error::ConnectionClosed) => true,
      Error::Database(tokio_rusqlite::Error::Close(_)) => true,
      Error::Database(tokio_rusqlite::Error::Rusqlite(e)) => matches!(
        e.sqlite_error_code(),
        Some(
          ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::NotADatabase
            | ErrorCode::DatabaseCorrupt
        )
      ),
      _ => false,
    }
  }
}
