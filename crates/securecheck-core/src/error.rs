//! Error types for `securecheck-core`.

use thiserror::Error;

use crate::flag::FlagId;

#[derive(Debug, Error)]
pub enum Error {
  #[error("flag not found: {0}")]
  FlagNotFound(FlagId),

  /// A stop record that the cleaner should never have produced, e.g. a blank
  /// vehicle number instead of the `"Unknown"` sentinel.
  #[error("malformed stop record ({vehicle_number:?} on {stop_date}): {detail}")]
  MalformedRecord {
    vehicle_number: String,
    stop_date:      chrono::NaiveDate,
    detail:         &'static str,
  },

  #[error("invalid detection config: {0}")]
  InvalidConfig(String),

  #[error("unknown insight: {0:?}")]
  UnknownInsight(String),

  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error as [`Error::Storage`].
  pub fn storage<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Storage(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
