//! SQL schema for the SecureCheck SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Cleaned stop records. Append-only; missing categoricals are 'Unknown'.
CREATE TABLE IF NOT EXISTS traffic_stops (
    stop_date          TEXT    NOT NULL,   -- YYYY-MM-DD
    stop_time          TEXT,               -- HH:MM:SS
    country_name       TEXT    NOT NULL DEFAULT 'Unknown',
    driver_gender      TEXT    NOT NULL DEFAULT 'Unknown',
    driver_age         INTEGER,
    driver_race        TEXT    NOT NULL DEFAULT 'Unknown',
    violation          TEXT    NOT NULL DEFAULT 'Unknown',
    search_conducted   INTEGER NOT NULL DEFAULT 0,
    is_arrested        INTEGER NOT NULL DEFAULT 0,
    drugs_related_stop INTEGER NOT NULL DEFAULT 0,
    vehicle_number     TEXT    NOT NULL DEFAULT 'Unknown'
);

CREATE INDEX IF NOT EXISTS stops_date_idx     ON traffic_stops(stop_date);
CREATE INDEX IF NOT EXISTS stops_violation_idx ON traffic_stops(violation);
CREATE INDEX IF NOT EXISTS stops_vehicle_idx  ON traffic_stops(vehicle_number);
CREATE INDEX IF NOT EXISTS stops_drugs_idx    ON traffic_stops(drugs_related_stop);
CREATE INDEX IF NOT EXISTS stops_age_idx      ON traffic_stops(driver_age);
CREATE INDEX IF NOT EXISTS stops_arrested_idx ON traffic_stops(is_arrested);
CREATE INDEX IF NOT EXISTS stops_country_idx  ON traffic_stops(country_name);
CREATE INDEX IF NOT EXISTS stops_gender_idx   ON traffic_stops(driver_gender);
CREATE INDEX IF NOT EXISTS stops_race_idx     ON traffic_stops(driver_race);

-- Flags are never deleted; `resolved` only ever goes from 0 to 1.
CREATE TABLE IF NOT EXISTS flagged_vehicles (
    flag_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    vehicle_number TEXT    NOT NULL,
    flag_reason    TEXT    NOT NULL,
    flag_timestamp TEXT    NOT NULL,   -- RFC 3339 UTC, fixed width; server-assigned
    resolved       INTEGER NOT NULL DEFAULT 0,
    CHECK (resolved IN (0, 1))
);

CREATE INDEX IF NOT EXISTS flags_vehicle_idx   ON flagged_vehicles(vehicle_number);
CREATE INDEX IF NOT EXISTS flags_timestamp_idx ON flagged_vehicles(flag_timestamp);

-- At most one unresolved flag per (vehicle_number, flag_reason).
CREATE UNIQUE INDEX IF NOT EXISTS flags_open_key_idx
    ON flagged_vehicles(vehicle_number, flag_reason)
    WHERE resolved = 0;

CREATE TRIGGER IF NOT EXISTS flags_resolution_one_way
BEFORE UPDATE OF resolved ON flagged_vehicles
WHEN OLD.resolved = 1 AND NEW.resolved = 0
BEGIN
    SELECT RAISE(ABORT, 'resolved flags cannot be reopened');
END;

CREATE TRIGGER IF NOT EXISTS flags_no_delete
BEFORE DELETE ON flagged_vehicles
BEGIN
    SELECT RAISE(ABORT, 'flags are never deleted');
END;

PRAGMA user_version = 1;
";
