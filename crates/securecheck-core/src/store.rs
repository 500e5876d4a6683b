//! The store traits.
//!
//! Backends (e.g. `securecheck-store-sqlite`) implement both traits. The
//! detection pass and the HTTP layer depend only on these abstractions.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  flag::{Flag, FlagCandidate, FlagId, FlagStatus, InsertOutcome, Resolution},
  insight::{Insight, InsightTable},
  stop::{StopQuery, StopRecord, StopSummary},
};

// ─── Stop records ────────────────────────────────────────────────────────────

/// Read access to the cleaned stop table, plus the bulk append used by the
/// ingestion collaborator.
pub trait StopStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Append already-cleaned records. Returns the number written.
  fn append_stops(
    &self,
    records: Vec<StopRecord>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Rows matching every set filter in `query`, newest first.
  fn search_stops<'a>(
    &'a self,
    query: &'a StopQuery,
  ) -> impl Future<Output = Result<Vec<StopRecord>, Self::Error>> + Send + 'a;

  fn stop_summary(&self) -> impl Future<Output = Result<StopSummary, Self::Error>> + Send + '_;

  fn run_insight(
    &self,
    insight: Insight,
  ) -> impl Future<Output = Result<InsightTable, Self::Error>> + Send + '_;
}

// ─── Flags ───────────────────────────────────────────────────────────────────

/// The flag table. Writes are limited to inserting unresolved flags and
/// resolving them; flags are never deleted.
pub trait FlagStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The most recent `flag_timestamp` across all flags, resolved or not.
  fn high_water_mark(
    &self,
  ) -> impl Future<Output = Result<Option<DateTime<Utc>>, Self::Error>> + Send + '_;

  /// Deduplication gate: `true` iff no unresolved flag has this
  /// `(vehicle, reason)` pair.
  fn should_insert<'a>(
    &'a self,
    vehicle_number: &'a str,
    flag_reason: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Append a new unresolved flag with a store-assigned timestamp.
  ///
  /// Does not consult the gate. Backends that enforce the at-most-one
  /// unresolved invariant with a constraint will fail here on a duplicate.
  fn insert_flag<'a>(
    &'a self,
    vehicle_number: &'a str,
    flag_reason: &'a str,
  ) -> impl Future<Output = Result<FlagId, Self::Error>> + Send + 'a;

  /// The gate check and the insert as one atomic step.
  fn insert_if_absent<'a>(
    &'a self,
    candidate: &'a FlagCandidate,
  ) -> impl Future<Output = Result<InsertOutcome, Self::Error>> + Send + 'a;

  /// Mark a flag resolved. Unknown ids come back as
  /// [`Resolution::NotFound`], not as success.
  fn resolve(
    &self,
    flag_id: FlagId,
  ) -> impl Future<Output = Result<Resolution, Self::Error>> + Send + '_;

  fn get_flag(
    &self,
    flag_id: FlagId,
  ) -> impl Future<Output = Result<Option<Flag>, Self::Error>> + Send + '_;

  /// Flags in the given state, newest `flag_timestamp` first.
  fn list_flags(
    &self,
    status: FlagStatus,
  ) -> impl Future<Output = Result<Vec<Flag>, Self::Error>> + Send + '_;
}
