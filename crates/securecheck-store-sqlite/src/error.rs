//! Error type for `securecheck-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The partial unique index refused a second unresolved flag for the key.
  #[error("unresolved flag already exists for {vehicle_number:?}: {flag_reason:?}")]
  DuplicateOpenFlag {
    vehicle_number: String,
    flag_reason:    String,
  },
}

impl Error {
  pub fn is_constraint_violation(&self) -> bool {
    matches!(
      self,
      Self::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)))
        if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
