//! Detection parameters.
//!
//! Every field has a serde default so a config file only needs to name what
//! it changes.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
  pub repeat_violation: RepeatViolationConfig,
  pub drug_involvement: DrugInvolvementConfig,
  pub high_arrest_rate: HighArrestRateConfig,
}

impl DetectionConfig {
  pub fn validate(&self) -> Result<()> {
    let rv = &self.repeat_violation;
    if rv.violation.trim().is_empty() {
      return Err(Error::InvalidConfig(
        "repeat_violation.violation must not be empty".into(),
      ));
    }
    if rv.window_days == 0 {
      return Err(Error::InvalidConfig(
        "repeat_violation.window_days must be at least 1".into(),
      ));
    }
    if self.drug_involvement.initial_lookback_days == 0 {
      return Err(Error::InvalidConfig(
        "drug_involvement.initial_lookback_days must be at least 1".into(),
      ));
    }
    let pct = self.high_arrest_rate.threshold_percent;
    if !(0.0..=100.0).contains(&pct) {
      return Err(Error::InvalidConfig(format!(
        "high_arrest_rate.threshold_percent must be within 0..=100, got {pct}"
      )));
    }
    Ok(())
  }
}

/// Vehicles stopped for the same violation more than `threshold` times inside
/// the trailing window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepeatViolationConfig {
  pub violation:   String,
  pub window_days: u32,
  /// Strict: a vehicle is flagged when its count is greater than this.
  pub threshold:   u32,
}

impl Default for RepeatViolationConfig {
  fn default() -> Self {
    Self { violation: "Speeding".into(), window_days: 30, threshold: 2 }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrugInvolvementConfig {
  /// How far back to scan when no flag has ever been written.
  pub initial_lookback_days: u32,
}

impl Default for DrugInvolvementConfig {
  fn default() -> Self { Self { initial_lookback_days: 365 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighArrestRateConfig {
  /// Strict: a group is flagged when its arrest rate is greater than this.
  pub threshold_percent: f64,
}

impl Default for HighArrestRateConfig {
  fn default() -> Self { Self { threshold_percent: 50.0 } }
}
