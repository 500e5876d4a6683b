//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Flag timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that `MAX()` and `ORDER BY` on the text column
//! agree with chronological order. Stop dates and times use ISO 8601.

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use securecheck_core::{
  flag::{Flag, FlagId},
  stop::{StopRecord, parse_stop_time},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── NaiveDate / NaiveTime ───────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_time(t: NaiveTime) -> String { t.format("%H:%M:%S").to_string() }

/// Accepts `HH:MM:SS` and `HH:MM`, like the JSON form.
pub fn decode_time(s: &str) -> Result<NaiveTime> {
  parse_stop_time(s).map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── LIKE patterns ───────────────────────────────────────────────────────────

/// `%needle%` with LIKE metacharacters escaped by `\`.
pub fn contains_pattern(needle: &str) -> String {
  let mut out = String::with_capacity(needle.len() + 2);
  out.push('%');
  for c in needle.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('%');
  out
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const STOP_COLUMNS: &str = "stop_date, stop_time, country_name, driver_gender, driver_age, \
   driver_race, violation, search_conducted, is_arrested, drugs_related_stop, vehicle_number";

/// Raw values read directly from a `traffic_stops` row.
pub struct RawStop {
  pub stop_date:          String,
  pub stop_time:          Option<String>,
  pub country_name:       String,
  pub driver_gender:      String,
  pub driver_age:         Option<u32>,
  pub driver_race:        String,
  pub violation:          String,
  pub search_conducted:   bool,
  pub is_arrested:        bool,
  pub drugs_related_stop: bool,
  pub vehicle_number:     String,
}

impl RawStop {
  /// Column order matches [`STOP_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      stop_date:          row.get(0)?,
      stop_time:          row.get(1)?,
      country_name:       row.get(2)?,
      driver_gender:      row.get(3)?,
      driver_age:         row.get(4)?,
      driver_race:        row.get(5)?,
      violation:          row.get(6)?,
      search_conducted:   row.get(7)?,
      is_arrested:        row.get(8)?,
      drugs_related_stop: row.get(9)?,
      vehicle_number:     row.get(10)?,
    })
  }

  pub fn into_record(self) -> Result<StopRecord> {
    Ok(StopRecord {
      stop_date:          decode_date(&self.stop_date)?,
      stop_time:          self.stop_time.as_deref().map(decode_time).transpose()?,
      country_name:       self.country_name,
      driver_gender:      self.driver_gender,
      driver_age:         self.driver_age,
      driver_race:        self.driver_race,
      violation:          self.violation,
      search_conducted:   self.search_conducted,
      is_arrested:        self.is_arrested,
      drugs_related_stop: self.drugs_related_stop,
      vehicle_number:     self.vehicle_number,
    })
  }
}

pub const FLAG_COLUMNS: &str = "flag_id, vehicle_number, flag_reason, flag_timestamp, resolved";

/// Raw values read directly from a `flagged_vehicles` row.
pub struct RawFlag {
  pub flag_id:        i64,
  pub vehicle_number: String,
  pub flag_reason:    String,
  pub flag_timestamp: String,
  pub resolved:       bool,
}

impl RawFlag {
  /// Column order matches [`FLAG_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      flag_id:        row.get(0)?,
      vehicle_number: row.get(1)?,
      flag_reason:    row.get(2)?,
      flag_timestamp: row.get(3)?,
      resolved:       row.get(4)?,
    })
  }

  pub fn into_flag(self) -> Result<Flag> {
    Ok(Flag {
      flag_id:        FlagId(self.flag_id),
      vehicle_number: self.vehicle_number,
      flag_reason:    self.flag_reason,
      flag_timestamp: decode_dt(&self.flag_timestamp)?,
      resolved:       self.resolved,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_as_text() {
    let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    let b = a + chrono::Duration::microseconds(1);
    let c = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
    let (ea, eb, ec) = (encode_dt(a), encode_dt(b), encode_dt(c));
    assert_eq!(ea.len(), ec.len());
    assert!(ea < eb && eb < ec);
    assert_eq!(decode_dt(&eb).unwrap(), b);
  }

  #[test]
  fn short_stop_times_decode() {
    assert_eq!(decode_time("20:15").unwrap(), NaiveTime::from_hms_opt(20, 15, 0).unwrap());
    assert_eq!(decode_time("06:05:09").unwrap(), NaiveTime::from_hms_opt(6, 5, 9).unwrap());
    assert!(decode_time("late").is_err());
  }

  #[test]
  fn like_metacharacters_are_escaped() {
    assert_eq!(contains_pattern("AB_1%"), "%AB\\_1\\%%");
  }
}
