//! Detection rules.
//!
//! Every rule is a pure function from a record snapshot and its parameters to
//! a list of [`FlagCandidate`]s, so thresholds can be tested without a store.
//! Each rule also names the [`StopQuery`] that loads a sufficient snapshot;
//! the rule re-applies its own predicates, so a broader snapshot gives the
//! same answer.
//!
//! Candidates come out in ascending vehicle order and reason strings are a
//! function of the inputs alone, since the reason is half of the key that
//! suppresses duplicate unresolved flags.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Days, NaiveDate, Utc};

use crate::{
  Error, Result,
  config::{DrugInvolvementConfig, HighArrestRateConfig, RepeatViolationConfig},
  flag::{FlagCandidate, RuleKind},
  stop::{StopQuery, StopRecord, is_unknown},
};

/// The order in which a detection pass runs the rules.
pub const PASS_ORDER: [RuleKind; 3] = [
  RuleKind::RepeatViolation,
  RuleKind::DrugInvolvement,
  RuleKind::HighArrestRate,
];

/// Fixed reason for the drug-involvement rule.
pub const DRUG_REASON: &str = "Involved in Drug-Related Stop";

pub fn repeat_violation_reason(violation: &str, count: usize, days: u32) -> String {
  format!("Multiple {violation} Violations ({count} in last {days} days)")
}

pub fn high_arrest_reason(race: &str, gender: &str) -> String {
  format!("High Arrest Rate Driver (Race: {race}, Gender: {gender})")
}

fn ensure_present(record: &StopRecord, value: &str, detail: &'static str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(Error::MalformedRecord {
      vehicle_number: record.vehicle_number.clone(),
      stop_date: record.stop_date,
      detail,
    });
  }
  Ok(())
}

fn ensure_vehicle(record: &StopRecord) -> Result<()> {
  ensure_present(record, &record.vehicle_number, "blank vehicle number")
}

// ─── Repeat violation ────────────────────────────────────────────────────────

/// First day (inclusive) of the trailing `window_days`-day window ending on
/// `today`. The day exactly `window_days` back is outside the window, so a
/// one-day window is `today` alone.
pub fn window_start(today: NaiveDate, window_days: u32) -> NaiveDate {
  today
    .checked_sub_days(Days::new(u64::from(window_days.saturating_sub(1))))
    .unwrap_or(NaiveDate::MIN)
}

pub fn repeat_violation_query(cfg: &RepeatViolationConfig, today: NaiveDate) -> StopQuery {
  StopQuery {
    violation: Some(cfg.violation.clone()),
    stop_date_from: Some(window_start(today, cfg.window_days)),
    ..StopQuery::unbounded()
  }
}

/// Flag every vehicle stopped for `cfg.violation` more than `cfg.threshold`
/// times since [`window_start`].
pub fn repeat_violation(
  records: &[StopRecord],
  cfg:     &RepeatViolationConfig,
  today:   NaiveDate,
) -> Result<Vec<FlagCandidate>> {
  let start = window_start(today, cfg.window_days);
  let mut counts: BTreeMap<&str, usize> = BTreeMap::new();

  for record in records {
    if record.violation != cfg.violation || record.stop_date < start {
      continue;
    }
    ensure_vehicle(record)?;
    if !record.has_known_vehicle() {
      continue;
    }
    *counts.entry(record.vehicle_number.as_str()).or_default() += 1;
  }

  Ok(
    counts
      .into_iter()
      .filter(|&(_, count)| count > cfg.threshold as usize)
      .map(|(vehicle, count)| FlagCandidate {
        rule:           RuleKind::RepeatViolation,
        vehicle_number: vehicle.to_owned(),
        flag_reason:    repeat_violation_reason(&cfg.violation, count, cfg.window_days),
      })
      .collect(),
  )
}

// ─── Drug involvement ────────────────────────────────────────────────────────

/// The earliest stop date the drug rule considers: the date of the newest
/// flag, or the start of the trailing `initial_lookback_days` window when
/// there are no flags.
pub fn drug_involvement_cursor(
  high_water_mark: Option<DateTime<Utc>>,
  cfg:             &DrugInvolvementConfig,
  now:             DateTime<Utc>,
) -> NaiveDate {
  match high_water_mark {
    Some(mark) => mark.date_naive(),
    None => window_start(now.date_naive(), cfg.initial_lookback_days),
  }
}

pub fn drug_involvement_query(since: NaiveDate) -> StopQuery {
  StopQuery {
    drugs_related_stop: Some(true),
    stop_date_from: Some(since),
    ..StopQuery::unbounded()
  }
}

/// One candidate per distinct vehicle with a drug-related stop on or after
/// `since`.
pub fn drug_involvement(records: &[StopRecord], since: NaiveDate) -> Result<Vec<FlagCandidate>> {
  let mut vehicles = BTreeSet::new();

  for record in records {
    if !record.drugs_related_stop || record.stop_date < since {
      continue;
    }
    ensure_vehicle(record)?;
    if record.has_known_vehicle() {
      vehicles.insert(record.vehicle_number.as_str());
    }
  }

  Ok(
    vehicles
      .into_iter()
      .map(|vehicle| FlagCandidate {
        rule:           RuleKind::DrugInvolvement,
        vehicle_number: vehicle.to_owned(),
        flag_reason:    DRUG_REASON.to_owned(),
      })
      .collect(),
  )
}

// ─── High arrest rate ────────────────────────────────────────────────────────

pub fn high_arrest_rate_query() -> StopQuery { StopQuery::unbounded() }

#[derive(Default)]
struct ArrestTally {
  stops:   u64,
  arrests: u64,
}

impl ArrestTally {
  fn rate_percent(&self) -> f64 {
    self.arrests as f64 * 100.0 / self.stops as f64
  }
}

/// Flag every `(vehicle, gender, race)` group whose arrest percentage is above
/// `cfg.threshold_percent`. Groups with an unknown component are skipped.
pub fn high_arrest_rate(
  records: &[StopRecord],
  cfg:     &HighArrestRateConfig,
) -> Result<Vec<FlagCandidate>> {
  let mut groups: BTreeMap<(&str, &str, &str), ArrestTally> = BTreeMap::new();

  for record in records {
    ensure_vehicle(record)?;
    ensure_present(record, &record.driver_gender, "blank driver gender")?;
    ensure_present(record, &record.driver_race, "blank driver race")?;
    if !record.has_known_vehicle()
      || is_unknown(&record.driver_gender)
      || is_unknown(&record.driver_race)
    {
      continue;
    }

    let tally = groups
      .entry((
        record.vehicle_number.as_str(),
        record.driver_gender.as_str(),
        record.driver_race.as_str(),
      ))
      .or_default();
    tally.stops += 1;
    if record.is_arrested {
      tally.arrests += 1;
    }
  }

  Ok(
    groups
      .into_iter()
      .filter(|(_, tally)| tally.rate_percent() > cfg.threshold_percent)
      .map(|((vehicle, gender, race), _)| FlagCandidate {
        rule:           RuleKind::HighArrestRate,
        vehicle_number: vehicle.to_owned(),
        flag_reason:    high_arrest_reason(race, gender),
      })
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn day(s: &str) -> NaiveDate { s.parse().unwrap() }

  fn speeding(vehicle: &str, date: &str) -> StopRecord {
    StopRecord {
      violation: "Speeding".into(),
      ..StopRecord::new(day(date), vehicle)
    }
  }

  fn driver(vehicle: &str, gender: &str, race: &str, arrested: bool) -> StopRecord {
    StopRecord {
      driver_gender: gender.into(),
      driver_race: race.into(),
      is_arrested: arrested,
      ..StopRecord::new(day("2024-01-10"), vehicle)
    }
  }

  // ── Repeat violation ───────────────────────────────────────────────────────

  #[test]
  fn three_speeding_stops_in_window_are_flagged() {
    let today = day("2024-03-31");
    let records = vec![
      speeding("MH12AB1234", "2024-03-05"),
      speeding("MH12AB1234", "2024-03-15"),
      speeding("MH12AB1234", "2024-03-30"),
      speeding("MH12AB9999", "2024-03-20"),
    ];

    let out = repeat_violation(&records, &RepeatViolationConfig::default(), today).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].vehicle_number, "MH12AB1234");
    assert!(out[0].flag_reason.contains("3 in last 30 days"));
    assert_eq!(
      out[0].flag_reason,
      "Multiple Speeding Violations (3 in last 30 days)"
    );
  }

  #[test]
  fn count_equal_to_threshold_is_not_flagged() {
    let today = day("2024-03-31");
    let records = vec![
      speeding("MH12AB1234", "2024-03-05"),
      speeding("MH12AB1234", "2024-03-15"),
    ];
    let out = repeat_violation(&records, &RepeatViolationConfig::default(), today).unwrap();
    assert!(out.is_empty());
  }

  #[test]
  fn stops_before_window_do_not_count() {
    let today = day("2024-03-31");
    let records = vec![
      speeding("MH12AB1234", "2024-02-01"),
      speeding("MH12AB1234", "2024-03-02"),
      speeding("MH12AB1234", "2024-03-15"),
      speeding("MH12AB1234", "2024-03-30"),
    ];
    let out = repeat_violation(&records, &RepeatViolationConfig::default(), today).unwrap();
    // 2024-03-02 is the first day of the window; 2024-02-01 is long gone.
    assert_eq!(out[0].flag_reason, "Multiple Speeding Violations (3 in last 30 days)");
  }

  #[test]
  fn stop_exactly_window_days_back_is_outside() {
    let today = day("2024-03-31");
    let records = vec![
      speeding("MH12AB1234", "2024-03-01"),
      speeding("MH12AB1234", "2024-03-15"),
      speeding("MH12AB1234", "2024-03-30"),
    ];
    let out = repeat_violation(&records, &RepeatViolationConfig::default(), today).unwrap();
    assert!(out.is_empty(), "{out:?}");

    assert_eq!(window_start(today, 30), day("2024-03-02"));
    assert_eq!(window_start(today, 1), today);
    let query = repeat_violation_query(&RepeatViolationConfig::default(), today);
    assert_eq!(query.stop_date_from, Some(day("2024-03-02")));
  }

  #[test]
  fn other_violations_are_ignored() {
    let today = day("2024-03-31");
    let mut records: Vec<_> = (0..5)
      .map(|_| StopRecord {
        violation: "Equipment".into(),
        ..StopRecord::new(day("2024-03-20"), "KA01XY0001")
      })
      .collect();
    records.push(speeding("KA01XY0001", "2024-03-21"));
    let out = repeat_violation(&records, &RepeatViolationConfig::default(), today).unwrap();
    assert!(out.is_empty());
  }

  #[test]
  fn configured_category_and_window_appear_in_reason() {
    let cfg = RepeatViolationConfig {
      violation:   "DUI".into(),
      window_days: 7,
      threshold:   0,
    };
    let records = vec![StopRecord {
      violation: "DUI".into(),
      ..StopRecord::new(day("2024-03-30"), "DL3CAB0001")
    }];
    let out = repeat_violation(&records, &cfg, day("2024-03-31")).unwrap();
    assert_eq!(out[0].flag_reason, "Multiple DUI Violations (1 in last 7 days)");
  }

  // ── Drug involvement ───────────────────────────────────────────────────────

  #[test]
  fn drug_stop_on_or_after_cursor_is_flagged_once() {
    let records = vec![
      StopRecord { drugs_related_stop: true, ..StopRecord::new(day("2024-05-02"), "TN09ZZ0001") },
      StopRecord { drugs_related_stop: true, ..StopRecord::new(day("2024-05-03"), "TN09ZZ0001") },
      StopRecord { drugs_related_stop: true, ..StopRecord::new(day("2024-04-30"), "TN09ZZ0002") },
      StopRecord { drugs_related_stop: false, ..StopRecord::new(day("2024-05-03"), "TN09ZZ0003") },
    ];

    let out = drug_involvement(&records, day("2024-05-02")).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].vehicle_number, "TN09ZZ0001");
    assert_eq!(out[0].flag_reason, DRUG_REASON);
  }

  #[test]
  fn cursor_uses_high_water_mark_date() {
    let mark = Utc.with_ymd_and_hms(2024, 5, 2, 18, 30, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let cfg = DrugInvolvementConfig::default();
    assert_eq!(drug_involvement_cursor(Some(mark), &cfg, now), day("2024-05-02"));
    assert_eq!(drug_involvement_cursor(None, &cfg, now), day("2023-06-03"));
  }

  // ── High arrest rate ───────────────────────────────────────────────────────

  #[test]
  fn two_of_three_arrests_is_flagged() {
    let records = vec![
      driver("AP05CD0001", "M", "Asian", true),
      driver("AP05CD0001", "M", "Asian", true),
      driver("AP05CD0001", "M", "Asian", false),
      driver("AP05CD0002", "F", "White", true),
      driver("AP05CD0002", "F", "White", false),
      driver("AP05CD0002", "F", "White", false),
    ];

    let out = high_arrest_rate(&records, &HighArrestRateConfig::default()).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].vehicle_number, "AP05CD0001");
    assert_eq!(out[0].flag_reason, "High Arrest Rate Driver (Race: Asian, Gender: M)");
  }

  #[test]
  fn rate_equal_to_threshold_is_not_flagged() {
    let records = vec![
      driver("AP05CD0001", "M", "Asian", true),
      driver("AP05CD0001", "M", "Asian", false),
    ];
    let out = high_arrest_rate(&records, &HighArrestRateConfig::default()).unwrap();
    assert!(out.is_empty());
  }

  #[test]
  fn groups_split_by_gender_and_race() {
    let records = vec![
      driver("AP05CD0001", "M", "Asian", true),
      driver("AP05CD0001", "F", "Asian", false),
      driver("AP05CD0001", "F", "Asian", false),
    ];
    let out = high_arrest_rate(&records, &HighArrestRateConfig::default()).unwrap();
    assert_eq!(out.len(), 1);
    assert!(out[0].flag_reason.contains("Gender: M"));
  }

  #[test]
  fn unknown_gender_or_race_is_skipped() {
    let records = vec![
      driver("AP05CD0001", "Unknown", "Asian", true),
      driver("AP05CD0002", "M", "Unknown", true),
    ];
    let out = high_arrest_rate(&records, &HighArrestRateConfig::default()).unwrap();
    assert!(out.is_empty());
  }

  // ── Shared ────────────────────────────────────────────────────────────────

  #[test]
  fn unknown_vehicle_is_never_a_candidate() {
    let today = day("2024-03-31");
    let records = vec![
      StopRecord {
        violation: "Speeding".into(),
        drugs_related_stop: true,
        is_arrested: true,
        driver_gender: "M".into(),
        driver_race: "Black".into(),
        ..StopRecord::new(day("2024-03-30"), "Unknown")
      };
      5
    ];

    assert!(repeat_violation(&records, &RepeatViolationConfig::default(), today).unwrap().is_empty());
    assert!(drug_involvement(&records, day("2024-01-01")).unwrap().is_empty());
    assert!(high_arrest_rate(&records, &HighArrestRateConfig::default()).unwrap().is_empty());
  }

  #[test]
  fn blank_vehicle_aborts_the_rule() {
    let records = vec![
      speeding("MH12AB1234", "2024-03-30"),
      speeding("  ", "2024-03-30"),
    ];
    let err = repeat_violation(&records, &RepeatViolationConfig::default(), day("2024-03-31"))
      .unwrap_err();
    assert!(matches!(err, Error::MalformedRecord { detail: "blank vehicle number", .. }));
  }
}
