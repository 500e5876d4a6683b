//! Flags: persisted assertions that a vehicle matched a detection rule.
//!
//! A flag is created unresolved and can only ever move to resolved. For a
//! given `(vehicle_number, flag_reason)` pair at most one unresolved flag
//! exists at a time; resolved flags with the same pair may pile up alongside
//! it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{Error, Result};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Surrogate key assigned by the store on insert; monotonically increasing.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FlagId(pub i64);

impl fmt::Display for FlagId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

// ─── Flag ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
  pub flag_id:        FlagId,
  pub vehicle_number: String,
  pub flag_reason:    String,
  /// Server-assigned at insert; the latest one is the detection high-water
  /// mark.
  pub flag_timestamp: DateTime<Utc>,
  pub resolved:       bool,
}

// ─── Candidate ───────────────────────────────────────────────────────────────

/// The rule that produced a candidate. `Display` gives the same snake_case
/// name as the JSON form, for log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleKind {
  RepeatViolation,
  DrugInvolvement,
  HighArrestRate,
}

/// A flag a rule would like to raise, not yet checked against the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCandidate {
  pub rule:           RuleKind,
  pub vehicle_number: String,
  pub flag_reason:    String,
}

// ─── Filters and outcomes ────────────────────────────────────────────────────

/// Which flags [`crate::store::FlagStore::list_flags`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagStatus {
  #[default]
  Unresolved,
  Resolved,
  All,
}

impl FlagStatus {
  /// The `resolved` column value to filter on, or `None` for no filter.
  pub fn resolved_filter(self) -> Option<bool> {
    match self {
      Self::Unresolved => Some(false),
      Self::Resolved => Some(true),
      Self::All => None,
    }
  }
}

/// Result of [`crate::store::FlagStore::insert_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
  Inserted(FlagId),
  /// An unresolved flag with the same key already exists.
  Suppressed,
}

/// Result of [`crate::store::FlagStore::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "flag", rename_all = "snake_case")]
pub enum Resolution {
  Resolved(Flag),
  /// The flag was resolved before this call; nothing changed.
  AlreadyResolved(Flag),
  NotFound(FlagId),
}

impl Resolution {
  /// Collapse into the flag, turning [`Resolution::NotFound`] into
  /// [`Error::FlagNotFound`].
  pub fn into_result(self) -> Result<Flag> {
    match self {
      Self::Resolved(flag) | Self::AlreadyResolved(flag) => Ok(flag),
      Self::NotFound(id) => Err(Error::FlagNotFound(id)),
    }
  }
}
