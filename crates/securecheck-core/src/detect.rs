//! The detection pass: run each rule, gate each candidate, write survivors.
//!
//! A pass walks `Idle → RunningRule → Deduplicating → Writing → … → Idle`.
//! Failures are contained at the narrowest level that makes sense: a rule
//! whose snapshot cannot be loaded or contains malformed data is skipped, and
//! a candidate whose write fails is skipped, but the pass always finishes and
//! reports what happened.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  config::DetectionConfig,
  flag::{FlagCandidate, FlagId, InsertOutcome, RuleKind},
  rules::{self, PASS_ORDER},
  store::{FlagStore, StopStore},
};

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "rule", rename_all = "snake_case")]
pub enum PassState {
  Idle,
  RunningRule(RuleKind),
  Deduplicating(RuleKind),
  Writing(RuleKind),
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// A candidate whose gate check or insert failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFailure {
  pub vehicle_number: String,
  pub flag_reason:    String,
  pub error:          String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleReport {
  pub rule:       RuleKind,
  pub candidates: usize,
  pub inserted:   Vec<FlagId>,
  /// Candidates dropped because an unresolved flag already exists.
  pub suppressed: usize,
  pub failures:   Vec<CandidateFailure>,
  /// Set when the rule produced no candidates because it aborted.
  pub error:      Option<String>,
}

impl RuleReport {
  fn new(rule: RuleKind, candidates: usize) -> Self {
    Self {
      rule,
      candidates,
      inserted: Vec::new(),
      suppressed: 0,
      failures: Vec::new(),
      error: None,
    }
  }

  fn aborted(rule: RuleKind, err: &Error) -> Self {
    Self { error: Some(err.to_string()), ..Self::new(rule, 0) }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
  pub evaluated_at: DateTime<Utc>,
  pub rules:        Vec<RuleReport>,
}

impl PassReport {
  pub fn inserted(&self) -> impl Iterator<Item = FlagId> + '_ {
    self.rules.iter().flat_map(|r| r.inserted.iter().copied())
  }

  pub fn inserted_count(&self) -> usize { self.inserted().count() }

  pub fn rule(&self, rule: RuleKind) -> Option<&RuleReport> {
    self.rules.iter().find(|r| r.rule == rule)
  }
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

/// One detection pass over a store that holds both stops and flags.
pub struct DetectionPass<'a, S> {
  store:  &'a S,
  config: &'a DetectionConfig,
  state:  PassState,
}

impl<'a, S> DetectionPass<'a, S>
where
  S: StopStore + FlagStore,
{
  /// Fails with [`Error::InvalidConfig`] if `config` does not validate.
  pub fn new(store: &'a S, config: &'a DetectionConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { store, config, state: PassState::Idle })
  }

  pub fn state(&self) -> PassState { self.state }

  /// Run every rule with the current time as the evaluation time.
  pub async fn run(&mut self) -> PassReport { self.run_at(Utc::now()).await }

  /// Run every rule as if the current time were `now`.
  pub async fn run_at(&mut self, now: DateTime<Utc>) -> PassReport {
    let mut report = PassReport { evaluated_at: now, rules: Vec::with_capacity(PASS_ORDER.len()) };

    for rule in PASS_ORDER {
      self.transition(PassState::RunningRule(rule));

      let candidates = match self.evaluate(rule, now).await {
        Ok(c) => c,
        Err(e) => {
          warn!(%rule, error = %e, "rule aborted");
          report.rules.push(RuleReport::aborted(rule, &e));
          continue;
        }
      };

      let mut rule_report = RuleReport::new(rule, candidates.len());
      for candidate in &candidates {
        self.apply(candidate, &mut rule_report).await;
      }
      report.rules.push(rule_report);
    }

    self.transition(PassState::Idle);
    info!(
      inserted = report.inserted_count(),
      aborted = report.rules.iter().filter(|r| r.error.is_some()).count(),
      "detection pass finished"
    );
    report
  }

  fn transition(&mut self, next: PassState) {
    debug!(from = ?self.state, to = ?next, "pass state");
    self.state = next;
  }

  async fn evaluate(&self, rule: RuleKind, now: DateTime<Utc>) -> Result<Vec<FlagCandidate>> {
    let today = now.date_naive();
    match rule {
      RuleKind::RepeatViolation => {
        let cfg = &self.config.repeat_violation;
        let query = rules::repeat_violation_query(cfg, today);
        let records = self.store.search_stops(&query).await.map_err(Error::storage)?;
        rules::repeat_violation(&records, cfg, today)
      }
      RuleKind::DrugInvolvement => {
        // Read here, not at pass start: flags written by earlier rules in this
        // pass move the cursor forward.
        let mark = self.store.high_water_mark().await.map_err(Error::storage)?;
        let since = rules::drug_involvement_cursor(mark, &self.config.drug_involvement, now);
        let query = rules::drug_involvement_query(since);
        let records = self.store.search_stops(&query).await.map_err(Error::storage)?;
        rules::drug_involvement(&records, since)
      }
      RuleKind::HighArrestRate => {
        let query = rules::high_arrest_rate_query();
        let records = self.store.search_stops(&query).await.map_err(Error::storage)?;
        rules::high_arrest_rate(&records, &self.config.high_arrest_rate)
      }
    }
  }

  /// Gate and write one candidate, recording the outcome in `report`.
  async fn apply(&mut self, candidate: &FlagCandidate, report: &mut RuleReport) {
    self.transition(PassState::Deduplicating(candidate.rule));
    let result = match self
      .store
      .should_insert(&candidate.vehicle_number, &candidate.flag_reason)
      .await
    {
      Ok(false) => Ok(InsertOutcome::Suppressed),
      Ok(true) => {
        self.transition(PassState::Writing(candidate.rule));
        // The store re-checks atomically; a concurrent writer may have won.
        self.store.insert_if_absent(candidate).await.map_err(Error::storage)
      }
      Err(e) => Err(Error::storage(e)),
    };

    match result {
      Ok(InsertOutcome::Inserted(id)) => {
        debug!(flag_id = %id, vehicle = %candidate.vehicle_number, reason = %candidate.flag_reason, "flag written");
        report.inserted.push(id);
      }
      Ok(InsertOutcome::Suppressed) => {
        debug!(vehicle = %candidate.vehicle_number, reason = %candidate.flag_reason, "open flag exists");
        report.suppressed += 1;
      }
      Err(e) => {
        warn!(vehicle = %candidate.vehicle_number, reason = %candidate.flag_reason, error = %e, "flag write failed");
        report.failures.push(CandidateFailure {
          vehicle_number: candidate.vehicle_number.clone(),
          flag_reason:    candidate.flag_reason.clone(),
          error:          e.to_string(),
        });
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use chrono::{NaiveDate, TimeZone};

  use super::*;
  use crate::{
    flag::{Flag, FlagStatus, Resolution},
    insight::{Insight, InsightTable},
    stop::{StopQuery, StopRecord, StopSummary},
  };

  #[derive(Debug, thiserror::Error)]
  #[error("injected failure")]
  struct Injected;

  /// Returns the whole stop table for every query; the rules filter.
  struct MemoryStore {
    stops:        Vec<StopRecord>,
    flags:        Mutex<Vec<Flag>>,
    fail_vehicle: Option<&'static str>,
    clock:        DateTime<Utc>,
  }

  impl MemoryStore {
    fn new(stops: Vec<StopRecord>, clock: DateTime<Utc>) -> Self {
      Self { stops, flags: Mutex::new(Vec::new()), fail_vehicle: None, clock }
    }

    fn flags(&self) -> Vec<Flag> { self.flags.lock().unwrap().clone() }
  }

  impl StopStore for MemoryStore {
    type Error = Injected;
    async fn append_stops(&self, _: Vec<StopRecord>) -> Result<usize, Injected> { unimplemented!() }
    async fn search_stops(&self, _: &StopQuery) -> Result<Vec<StopRecord>, Injected> {
      Ok(self.stops.clone())
    }
    async fn stop_summary(&self) -> Result<StopSummary, Injected> { unimplemented!() }
    async fn run_insight(&self, _: Insight) -> Result<InsightTable, Injected> { unimplemented!() }
  }

  impl FlagStore for MemoryStore {
    type Error = Injected;

    async fn high_water_mark(&self) -> Result<Option<DateTime<Utc>>, Injected> {
      Ok(self.flags.lock().unwrap().iter().map(|f| f.flag_timestamp).max())
    }

    async fn should_insert(&self, vehicle: &str, reason: &str) -> Result<bool, Injected> {
      Ok(!self.flags.lock().unwrap().iter().any(|f| {
        !f.resolved && f.vehicle_number == vehicle && f.flag_reason == reason
      }))
    }

    async fn insert_flag(&self, vehicle: &str, reason: &str) -> Result<FlagId, Injected> {
      if self.fail_vehicle == Some(vehicle) {
        return Err(Injected);
      }
      let mut flags = self.flags.lock().unwrap();
      let id = FlagId(flags.len() as i64 + 1);
      flags.push(Flag {
        flag_id:        id,
        vehicle_number: vehicle.to_owned(),
        flag_reason:    reason.to_owned(),
        flag_timestamp: self.clock,
        resolved:       false,
      });
      Ok(id)
    }

    async fn insert_if_absent(&self, c: &FlagCandidate) -> Result<InsertOutcome, Injected> {
      if !self.should_insert(&c.vehicle_number, &c.flag_reason).await? {
        return Ok(InsertOutcome::Suppressed);
      }
      Ok(InsertOutcome::Inserted(self.insert_flag(&c.vehicle_number, &c.flag_reason).await?))
    }

    async fn resolve(&self, _: FlagId) -> Result<Resolution, Injected> { unimplemented!() }
    async fn get_flag(&self, _: FlagId) -> Result<Option<Flag>, Injected> { unimplemented!() }
    async fn list_flags(&self, _: FlagStatus) -> Result<Vec<Flag>, Injected> { unimplemented!() }
  }

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap() }

  fn day(s: &str) -> NaiveDate { s.parse().unwrap() }

  fn speeding(vehicle: &str, date: &str) -> StopRecord {
    StopRecord { violation: "Speeding".into(), ..StopRecord::new(day(date), vehicle) }
  }

  fn repeat_offender(vehicle: &str) -> Vec<StopRecord> {
    ["2024-03-10", "2024-03-20", "2024-03-30"]
      .into_iter()
      .map(|d| speeding(vehicle, d))
      .collect()
  }

  #[tokio::test]
  async fn second_pass_writes_nothing() {
    let store = MemoryStore::new(repeat_offender("MH12AB1234"), now());
    let config = DetectionConfig::default();

    let first = DetectionPass::new(&store, &config).unwrap().run_at(now()).await;
    assert_eq!(first.inserted_count(), 1);

    let mut pass = DetectionPass::new(&store, &config).unwrap();
    let second = pass.run_at(now()).await;
    assert_eq!(second.inserted_count(), 0);
    assert_eq!(second.rule(RuleKind::RepeatViolation).unwrap().suppressed, 1);
    assert_eq!(pass.state(), PassState::Idle);
    assert_eq!(store.flags().len(), 1);
  }

  #[tokio::test]
  async fn failed_insert_does_not_stop_other_candidates() {
    let mut stops = repeat_offender("MH12AB0001");
    stops.extend(repeat_offender("MH12AB0002"));
    stops.extend(repeat_offender("MH12AB0003"));
    let mut store = MemoryStore::new(stops, now());
    store.fail_vehicle = Some("MH12AB0002");

    let config = DetectionConfig::default();
    let report = DetectionPass::new(&store, &config).unwrap().run_at(now()).await;

    let repeat = report.rule(RuleKind::RepeatViolation).unwrap();
    assert_eq!(repeat.candidates, 3);
    assert_eq!(repeat.inserted.len(), 2);
    assert_eq!(repeat.failures.len(), 1);
    assert_eq!(repeat.failures[0].vehicle_number, "MH12AB0002");
    assert!(repeat.error.is_none());
  }

  #[tokio::test]
  async fn malformed_record_aborts_only_the_rules_that_see_it() {
    let mut stops = repeat_offender("MH12AB1234");
    stops.push(StopRecord { drugs_related_stop: true, ..StopRecord::new(day("2024-03-31"), "") });
    let store = MemoryStore::new(stops, now());

    let config = DetectionConfig::default();
    let report = DetectionPass::new(&store, &config).unwrap().run_at(now()).await;

    assert_eq!(report.rule(RuleKind::RepeatViolation).unwrap().inserted.len(), 1);
    assert!(report.rule(RuleKind::DrugInvolvement).unwrap().error.is_some());
    assert!(report.rule(RuleKind::HighArrestRate).unwrap().error.is_some());
    assert_eq!(report.rules.len(), 3);
  }

  #[tokio::test]
  async fn drug_cursor_sees_flags_from_earlier_rules() {
    let mut stops = repeat_offender("MH12AB1234");
    // Before the timestamp the speeding flag will carry, so it is skipped.
    stops.push(StopRecord { drugs_related_stop: true, ..StopRecord::new(day("2024-03-30"), "KA01XY0001") });
    stops.push(StopRecord { drugs_related_stop: true, ..StopRecord::new(day("2024-03-31"), "KA01XY0002") });
    let store = MemoryStore::new(stops, now());

    let config = DetectionConfig::default();
    let report = DetectionPass::new(&store, &config).unwrap().run_at(now()).await;

    let drug = report.rule(RuleKind::DrugInvolvement).unwrap();
    assert_eq!(drug.candidates, 1);
    let flagged: Vec<_> = store.flags().into_iter().map(|f| f.vehicle_number).collect();
    assert!(flagged.contains(&"KA01XY0002".to_owned()));
    assert!(!flagged.contains(&"KA01XY0001".to_owned()));
  }

  #[tokio::test]
  async fn invalid_config_is_rejected_up_front() {
    let store = MemoryStore::new(Vec::new(), now());
    let mut config = DetectionConfig::default();
    config.repeat_violation.window_days = 0;
    assert!(matches!(DetectionPass::new(&store, &config), Err(Error::InvalidConfig(_))));
  }
}
