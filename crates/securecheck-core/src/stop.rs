//! Stop records: the append-only fact table the detector reads.
//!
//! Records arrive already cleaned: every missing categorical value has been
//! replaced by the [`UNKNOWN`] sentinel, and unparseable dates have been
//! dropped.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Sentinel written by the cleaner for any missing categorical value.
pub const UNKNOWN: &str = "Unknown";

/// Default row cap for [`StopQuery`] when the caller sets none.
pub const DEFAULT_STOP_LIMIT: usize = 1000;

/// Returns `true` if `value` is the missing-value sentinel.
pub fn is_unknown(value: &str) -> bool { value == UNKNOWN }

/// Parse a stop time as `HH:MM:SS`, falling back to the `HH:MM` form found in
/// raw exports.
pub fn parse_stop_time(s: &str) -> chrono::ParseResult<NaiveTime> {
  NaiveTime::parse_from_str(s, "%H:%M:%S").or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
}

/// Serde adapter for `Option<NaiveTime>`: reads either time form, writes
/// `HH:MM:SS`.
mod stop_time_format {
  use chrono::NaiveTime;
  use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

  pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, ser: S) -> Result<S::Ok, S::Error> {
    match time {
      Some(t) => ser.serialize_some(&t.format("%H:%M:%S").to_string()),
      None => ser.serialize_none(),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<NaiveTime>, D::Error> {
    Option::<String>::deserialize(de)?
      .map(|s| super::parse_stop_time(&s).map_err(|e| D::Error::custom(format!("stop_time {s:?}: {e}"))))
      .transpose()
  }
}

// ─── StopRecord ──────────────────────────────────────────────────────────────

/// One logged traffic-stop observation. Never updated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopRecord {
  pub stop_date:          NaiveDate,
  #[serde(default, with = "stop_time_format")]
  pub stop_time:          Option<NaiveTime>,
  pub country_name:       String,
  pub driver_gender:      String,
  /// `None` where the source had no usable age.
  pub driver_age:         Option<u32>,
  pub driver_race:        String,
  pub violation:          String,
  #[serde(default)]
  pub search_conducted:   bool,
  #[serde(default)]
  pub is_arrested:        bool,
  #[serde(default)]
  pub drugs_related_stop: bool,
  pub vehicle_number:     String,
}

impl StopRecord {
  /// A record with every categorical field set to [`UNKNOWN`] and every flag
  /// false. Handy as a base for struct-update syntax.
  pub fn new(stop_date: NaiveDate, vehicle_number: impl Into<String>) -> Self {
    Self {
      stop_date,
      stop_time: None,
      country_name: UNKNOWN.to_owned(),
      driver_gender: UNKNOWN.to_owned(),
      driver_age: None,
      driver_race: UNKNOWN.to_owned(),
      violation: UNKNOWN.to_owned(),
      search_conducted: false,
      is_arrested: false,
      drugs_related_stop: false,
      vehicle_number: vehicle_number.into(),
    }
  }

  /// Whether the vehicle is identified at all.
  pub fn has_known_vehicle(&self) -> bool {
    !is_unknown(&self.vehicle_number)
  }
}

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`crate::store::StopStore::search_stops`].
///
/// Every `None` field is unconstrained. Results are ordered by
/// `stop_date DESC, stop_time DESC`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopQuery {
  pub country_name:       Option<String>,
  pub driver_gender:      Option<String>,
  pub violation:          Option<String>,
  pub min_age:            Option<u32>,
  pub max_age:            Option<u32>,
  /// Substring match on `vehicle_number`.
  pub vehicle_contains:   Option<String>,
  pub search_conducted:   Option<bool>,
  pub is_arrested:        Option<bool>,
  pub drugs_related_stop: Option<bool>,
  /// Inclusive lower bound on `stop_date`.
  pub stop_date_from:     Option<NaiveDate>,
  /// Defaults to [`DEFAULT_STOP_LIMIT`].
  pub limit:              Option<usize>,
}

impl StopQuery {
  /// A query with no filters and no row cap, used by rules that need the full
  /// table.
  pub fn unbounded() -> Self {
    Self { limit: Some(usize::MAX), ..Self::default() }
  }

  pub fn effective_limit(&self) -> usize {
    self.limit.unwrap_or(DEFAULT_STOP_LIMIT)
  }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Headline counters over the whole stop table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopSummary {
  pub total_stops:    u64,
  pub total_arrests:  u64,
  pub total_searches: u64,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn record(stop_time: serde_json::Value) -> serde_json::Result<StopRecord> {
    serde_json::from_value(json!({
      "stop_date": "2024-03-31",
      "stop_time": stop_time,
      "country_name": "India",
      "driver_gender": "F",
      "driver_age": 31,
      "driver_race": "Asian",
      "violation": "Speeding",
      "vehicle_number": "KA01XY0001",
    }))
  }

  #[test]
  fn stop_time_accepts_both_forms() {
    let short = record(json!("20:15")).unwrap();
    assert_eq!(short.stop_time, NaiveTime::from_hms_opt(20, 15, 0));
    let long = record(json!("06:05:09")).unwrap();
    assert_eq!(long.stop_time, NaiveTime::from_hms_opt(6, 5, 9));
    assert_eq!(record(json!(null)).unwrap().stop_time, None);
    assert!(record(json!("late")).is_err());
  }

  #[test]
  fn stop_time_is_optional_and_written_with_seconds() {
    let mut body = serde_json::to_value(StopRecord::new(NaiveDate::MIN, "A")).unwrap();
    assert_eq!(body["stop_time"], json!(null));
    body.as_object_mut().unwrap().remove("stop_time");
    let parsed: StopRecord = serde_json::from_value(body).unwrap();
    assert_eq!(parsed.stop_time, None);

    let at = StopRecord { stop_time: NaiveTime::from_hms_opt(20, 15, 0), ..parsed };
    assert_eq!(serde_json::to_value(&at).unwrap()["stop_time"], json!("20:15:00"));
  }
}
