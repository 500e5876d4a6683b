//! [`SqliteStore`], the SQLite implementation of [`StopStore`] and
//! [`FlagStore`].

use std::{path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use serde::Deserialize;
use tracing::{debug, info};

use securecheck_core::{
  flag::{Flag, FlagCandidate, FlagId, FlagStatus, InsertOutcome, Resolution},
  insight::{Insight, InsightTable},
  stop::{StopQuery, StopRecord, StopSummary},
  store::{FlagStore, StopStore},
};

use crate::{
  encode::{
    FLAG_COLUMNS, RawFlag, RawStop, STOP_COLUMNS, contains_pattern, decode_dt, encode_date,
    encode_dt, encode_time,
  },
  insight,
  schema::SCHEMA,
  Error, Result,
};

const COUNT_OPEN_SQL: &str = "SELECT COUNT(*) FROM flagged_vehicles
   WHERE vehicle_number = ?1 AND flag_reason = ?2 AND resolved = 0";

const INSERT_FLAG_SQL: &str = "INSERT INTO flagged_vehicles
   (vehicle_number, flag_reason, flag_timestamp, resolved) VALUES (?1, ?2, ?3, 0)";

// ─── Configuration ───────────────────────────────────────────────────────────

/// Connection settings, deserialised from the `[store]` config table.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
  pub path:            PathBuf,
  /// How long a writer waits on a locked database before failing.
  #[serde(default = "default_busy_timeout_ms")]
  pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 { 5_000 }

impl StoreConfig {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into(), busy_timeout_ms: default_busy_timeout_ms() }
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A SecureCheck store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) the database named by `config` and run schema
  /// initialisation.
  pub async fn open(config: &StoreConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(&config.path).await?;
    let store = Self { conn };
    store.init(Duration::from_millis(config.busy_timeout_ms)).await?;
    info!(path = %config.path.display(), "opened sqlite store");
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init(Duration::from_millis(default_busy_timeout_ms())).await?;
    Ok(store)
  }

  async fn init(&self, busy_timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── StopStore impl ──────────────────────────────────────────────────────────

impl StopStore for SqliteStore {
  type Error = Error;

  async fn append_stops(&self, records: Vec<StopRecord>) -> Result<usize> {
    let count = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(&format!(
            "INSERT INTO traffic_stops ({STOP_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
          ))?;
          for r in &records {
            stmt.execute(rusqlite::params![
              encode_date(r.stop_date),
              r.stop_time.map(encode_time),
              r.country_name,
              r.driver_gender,
              r.driver_age,
              r.driver_race,
              r.violation,
              r.search_conducted,
              r.is_arrested,
              r.drugs_related_stop,
              r.vehicle_number,
            ])?;
          }
        }
        tx.commit()?;
        Ok(records.len())
      })
      .await?;

    debug!(count, "appended stop records");
    Ok(count)
  }

  async fn search_stops(&self, query: &StopQuery) -> Result<Vec<StopRecord>> {
    let country   = query.country_name.clone();
    let gender    = query.driver_gender.clone();
    let violation = query.violation.clone();
    let min_age   = query.min_age;
    let max_age   = query.max_age;
    let vehicle   = query.vehicle_contains.as_deref().map(contains_pattern);
    let searched  = query.search_conducted;
    let arrested  = query.is_arrested;
    let drugs     = query.drugs_related_stop;
    let date_from = query.stop_date_from.map(encode_date);
    // A negative LIMIT means "no limit" to SQLite.
    let limit     = i64::try_from(query.effective_limit()).unwrap_or(-1);

    let raws: Vec<RawStop> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {STOP_COLUMNS} FROM traffic_stops
           WHERE (?1 IS NULL OR country_name = ?1)
             AND (?2 IS NULL OR driver_gender = ?2)
             AND (?3 IS NULL OR violation = ?3)
             AND (?4 IS NULL OR driver_age >= ?4)
             AND (?5 IS NULL OR driver_age <= ?5)
             AND (?6 IS NULL OR vehicle_number LIKE ?6 ESCAPE '\\')
             AND (?7 IS NULL OR search_conducted = ?7)
             AND (?8 IS NULL OR is_arrested = ?8)
             AND (?9 IS NULL OR drugs_related_stop = ?9)
             AND (?10 IS NULL OR stop_date >= ?10)
           ORDER BY stop_date DESC, stop_time DESC
           LIMIT ?11"
        ))?;

        let rows = stmt
          .query_map(
            rusqlite::params![
              country, gender, violation, min_age, max_age, vehicle, searched, arrested,
              drugs, date_from, limit,
            ],
            RawStop::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStop::into_record).collect()
  }

  async fn stop_summary(&self) -> Result<StopSummary> {
    let (stops, arrests, searches): (i64, i64, i64) = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*),
                  COALESCE(SUM(is_arrested), 0),
                  COALESCE(SUM(search_conducted), 0)
           FROM traffic_stops",
          [],
          |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?)
      })
      .await?;

    Ok(StopSummary {
      total_stops:    stops.unsigned_abs(),
      total_arrests:  arrests.unsigned_abs(),
      total_searches: searches.unsigned_abs(),
    })
  }

  async fn run_insight(&self, which: Insight) -> Result<InsightTable> {
    let table = self
      .conn
      .call(move |conn| Ok(insight::run(conn, which)?))
      .await?;
    debug!(insight = %which, rows = table.rows.len(), "ran insight");
    Ok(table)
  }
}

// ─── FlagStore impl ──────────────────────────────────────────────────────────

impl FlagStore for SqliteStore {
  type Error = Error;

  async fn high_water_mark(&self) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT MAX(flag_timestamp) FROM flagged_vehicles", [], |row| {
          row.get(0)
        })?)
      })
      .await?;

    raw.as_deref().map(decode_dt).transpose()
  }

  async fn should_insert(&self, vehicle_number: &str, flag_reason: &str) -> Result<bool> {
    let vehicle = vehicle_number.to_owned();
    let reason  = flag_reason.to_owned();

    let open: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(COUNT_OPEN_SQL, rusqlite::params![vehicle, reason], |row| row.get(0))?)
      })
      .await?;

    Ok(open == 0)
  }

  async fn insert_flag(&self, vehicle_number: &str, flag_reason: &str) -> Result<FlagId> {
    let vehicle = vehicle_number.to_owned();
    let reason  = flag_reason.to_owned();
    let at      = encode_dt(Utc::now());

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(INSERT_FLAG_SQL, rusqlite::params![vehicle, reason, at])?;
        Ok(conn.last_insert_rowid())
      })
      .await
      .map_err(Error::from)
      .map_err(|e| {
        if e.is_constraint_violation() {
          Error::DuplicateOpenFlag {
            vehicle_number: vehicle_number.to_owned(),
            flag_reason:    flag_reason.to_owned(),
          }
        } else {
          e
        }
      })?;

    Ok(FlagId(id))
  }

  async fn insert_if_absent(&self, candidate: &FlagCandidate) -> Result<InsertOutcome> {
    let vehicle = candidate.vehicle_number.clone();
    let reason  = candidate.flag_reason.clone();
    let at      = encode_dt(Utc::now());

    // IMMEDIATE takes the write lock before the count, so no other writer can
    // slip an insert between the check and ours.
    let id: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let open: i64 =
          tx.query_row(COUNT_OPEN_SQL, rusqlite::params![vehicle, reason], |row| row.get(0))?;
        if open > 0 {
          return Ok(None);
        }
        tx.execute(INSERT_FLAG_SQL, rusqlite::params![vehicle, reason, at])?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Some(id))
      })
      .await?;

    Ok(match id {
      Some(id) => InsertOutcome::Inserted(FlagId(id)),
      None => InsertOutcome::Suppressed,
    })
  }

  async fn resolve(&self, flag_id: FlagId) -> Result<Resolution> {
    let id = flag_id.0;

    let found: Option<(RawFlag, bool)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let raw = tx
          .query_row(
            &format!("SELECT {FLAG_COLUMNS} FROM flagged_vehicles WHERE flag_id = ?1"),
            rusqlite::params![id],
            RawFlag::from_row,
          )
          .optional()?;

        let Some(mut raw) = raw else {
          return Ok(None);
        };
        let was_resolved = raw.resolved;
        if !was_resolved {
          tx.execute(
            "UPDATE flagged_vehicles SET resolved = 1 WHERE flag_id = ?1",
            rusqlite::params![id],
          )?;
          raw.resolved = true;
        }
        tx.commit()?;
        Ok(Some((raw, was_resolved)))
      })
      .await?;

    Ok(match found {
      None => Resolution::NotFound(flag_id),
      Some((raw, true)) => Resolution::AlreadyResolved(raw.into_flag()?),
      Some((raw, false)) => {
        info!(%flag_id, "flag resolved");
        Resolution::Resolved(raw.into_flag()?)
      }
    })
  }

  async fn get_flag(&self, flag_id: FlagId) -> Result<Option<Flag>> {
    let id = flag_id.0;

    let raw: Option<RawFlag> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {FLAG_COLUMNS} FROM flagged_vehicles WHERE flag_id = ?1"),
              rusqlite::params![id],
              RawFlag::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawFlag::into_flag).transpose()
  }

  async fn list_flags(&self, status: FlagStatus) -> Result<Vec<Flag>> {
    let resolved = status.resolved_filter();

    let raws: Vec<RawFlag> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FLAG_COLUMNS} FROM flagged_vehicles
           WHERE (?1 IS NULL OR resolved = ?1)
           ORDER BY flag_timestamp DESC, flag_id DESC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![resolved], RawFlag::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFlag::into_flag).collect()
  }
}
