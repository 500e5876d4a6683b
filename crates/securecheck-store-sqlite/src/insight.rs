//! SQL for the fixed insight reports.
//!
//! Hours come from the first two characters of `stop_time`; years from
//! `strftime` over `stop_date`. Flag columns are 0/1 integers, so `SUM()`
//! counts them directly.

use rusqlite::types::ValueRef;
use securecheck_core::insight::{Insight, InsightTable};

pub fn sql(insight: Insight) -> &'static str {
  match insight {
    Insight::TopDrugRelatedVehicles => "
      SELECT vehicle_number, COUNT(*) AS stop_count
      FROM traffic_stops
      WHERE drugs_related_stop = 1 AND vehicle_number != 'Unknown'
      GROUP BY vehicle_number
      ORDER BY stop_count DESC, vehicle_number
      LIMIT 10",
    Insight::MostSearchedVehicles => "
      SELECT vehicle_number, COUNT(*) AS search_count
      FROM traffic_stops
      WHERE search_conducted = 1 AND vehicle_number != 'Unknown'
      GROUP BY vehicle_number
      ORDER BY search_count DESC, vehicle_number
      LIMIT 10",
    Insight::ArrestRateByAgeGroup => "
      SELECT
        CASE
          WHEN driver_age BETWEEN 15 AND 20 THEN '15-20'
          WHEN driver_age BETWEEN 21 AND 25 THEN '21-25'
          WHEN driver_age BETWEEN 26 AND 35 THEN '26-35'
          WHEN driver_age BETWEEN 36 AND 50 THEN '36-50'
          WHEN driver_age > 50 THEN '50+'
          ELSE 'Unknown'
        END AS age_group,
        SUM(is_arrested) * 100.0 / COUNT(*) AS arrest_rate
      FROM traffic_stops
      WHERE driver_age > 0
      GROUP BY age_group
      ORDER BY arrest_rate DESC",
    Insight::GenderByCountry => "
      SELECT country_name, driver_gender, COUNT(*) AS stop_count
      FROM traffic_stops
      WHERE country_name != 'Unknown' AND driver_gender != 'Unknown'
      GROUP BY country_name, driver_gender
      ORDER BY country_name, driver_gender",
    Insight::SearchRateByRaceGender => "
      SELECT driver_race, driver_gender,
             SUM(search_conducted) * 100.0 / COUNT(*) AS search_rate
      FROM traffic_stops
      WHERE driver_race != 'Unknown' AND driver_gender != 'Unknown'
      GROUP BY driver_race, driver_gender
      ORDER BY search_rate DESC
      LIMIT 10",
    Insight::StopsByHour => "
      SELECT CAST(substr(stop_time, 1, 2) AS INTEGER) AS hour_of_day,
             COUNT(*) AS stop_count
      FROM traffic_stops
      WHERE stop_time IS NOT NULL
      GROUP BY hour_of_day
      ORDER BY stop_count DESC, hour_of_day",
    Insight::NightArrestRate => "
      SELECT
        CASE
          WHEN CAST(substr(stop_time, 1, 2) AS INTEGER) >= 20
            OR CAST(substr(stop_time, 1, 2) AS INTEGER) < 6 THEN 'Night'
          ELSE 'Day'
        END AS time_of_day_category,
        SUM(is_arrested) * 100.0 / COUNT(*) AS arrest_rate
      FROM traffic_stops
      WHERE stop_time IS NOT NULL
      GROUP BY time_of_day_category
      ORDER BY arrest_rate DESC",
    Insight::ViolationSearchArrestRates => "
      SELECT violation,
             SUM(search_conducted) * 100.0 / COUNT(*) AS search_rate,
             SUM(is_arrested) * 100.0 / COUNT(*) AS arrest_rate
      FROM traffic_stops
      WHERE violation != 'Unknown'
      GROUP BY violation
      ORDER BY search_rate DESC, arrest_rate DESC",
    Insight::YoungDriverViolations => "
      SELECT violation, COUNT(*) AS stop_count
      FROM traffic_stops
      WHERE driver_age > 0 AND driver_age < 25 AND violation != 'Unknown'
      GROUP BY violation
      ORDER BY stop_count DESC, violation
      LIMIT 10",
    Insight::RarelyEscalatedViolations => "
      SELECT violation,
             SUM(search_conducted) * 100.0 / COUNT(*) AS search_rate,
             SUM(is_arrested) * 100.0 / COUNT(*) AS arrest_rate
      FROM traffic_stops
      WHERE violation != 'Unknown'
      GROUP BY violation
      HAVING search_rate < 5 AND arrest_rate < 5
      ORDER BY search_rate ASC, arrest_rate ASC
      LIMIT 5",
    Insight::DrugStopRateByCountry => "
      SELECT country_name,
             SUM(drugs_related_stop) * 100.0 / COUNT(*) AS drug_related_stop_rate
      FROM traffic_stops
      WHERE country_name != 'Unknown'
      GROUP BY country_name
      ORDER BY drug_related_stop_rate DESC
      LIMIT 10",
    Insight::ArrestRateByCountryViolation => "
      SELECT country_name, violation,
             SUM(is_arrested) * 100.0 / COUNT(*) AS arrest_rate
      FROM traffic_stops
      WHERE country_name != 'Unknown' AND violation != 'Unknown'
      GROUP BY country_name, violation
      HAVING COUNT(*) > 10
      ORDER BY country_name, arrest_rate DESC",
    Insight::CountriesMostSearched => "
      SELECT country_name, COUNT(*) AS search_conducted_stops_count
      FROM traffic_stops
      WHERE search_conducted = 1 AND country_name != 'Unknown'
      GROUP BY country_name
      ORDER BY search_conducted_stops_count DESC
      LIMIT 5",
    Insight::YearlyStopsByCountry => "
      SELECT CAST(strftime('%Y', stop_date) AS INTEGER) AS stop_year,
             country_name,
             COUNT(*) AS total_stops,
             SUM(is_arrested) AS total_arrests,
             SUM(is_arrested) * 100.0 / COUNT(*) AS arrest_rate_percentage
      FROM traffic_stops
      WHERE country_name != 'Unknown'
      GROUP BY stop_year, country_name
      ORDER BY stop_year, country_name",
    Insight::TopArrestViolations => "
      SELECT violation, SUM(is_arrested) * 100.0 / COUNT(*) AS arrest_rate
      FROM traffic_stops
      WHERE violation != 'Unknown'
      GROUP BY violation
      ORDER BY arrest_rate DESC
      LIMIT 5",
    Insight::ViolationsByAgeRace => "
      SELECT driver_race, driver_age, violation, COUNT(*) AS violation_count
      FROM traffic_stops
      WHERE driver_race != 'Unknown' AND violation != 'Unknown' AND driver_age > 0
      GROUP BY driver_race, driver_age, violation
      ORDER BY driver_race, driver_age, violation_count DESC, violation
      LIMIT 100",
    Insight::StopsByPeriod => "
      SELECT CAST(strftime('%Y', stop_date) AS INTEGER) AS stop_year,
             CAST(strftime('%m', stop_date) AS INTEGER) AS stop_month,
             CAST(substr(stop_time, 1, 2) AS INTEGER) AS stop_hour,
             COUNT(*) AS number_of_stops
      FROM traffic_stops
      WHERE stop_time IS NOT NULL
      GROUP BY stop_year, stop_month, stop_hour
      ORDER BY stop_year, stop_month, stop_hour",
    Insight::HighSearchArrestViolations => "
      WITH violation_stats AS (
        SELECT violation,
               COUNT(*) AS total_stops,
               SUM(search_conducted) AS total_searches,
               SUM(is_arrested) AS total_arrests
        FROM traffic_stops
        WHERE violation != 'Unknown'
        GROUP BY violation
      )
      SELECT violation, total_stops, total_searches, total_arrests,
             total_searches * 100.0 / total_stops AS search_rate_percentage,
             total_arrests * 100.0 / total_stops AS arrest_rate_percentage
      FROM violation_stats
      WHERE total_stops > 50
      ORDER BY search_rate_percentage DESC, arrest_rate_percentage DESC
      LIMIT 10",
    Insight::DemographicsByCountry => "
      SELECT country_name, driver_gender, driver_race,
             COUNT(*) AS total_stops,
             AVG(driver_age) AS average_driver_age
      FROM traffic_stops
      WHERE country_name != 'Unknown' AND driver_gender != 'Unknown'
        AND driver_race != 'Unknown' AND driver_age > 0
      GROUP BY country_name, driver_gender, driver_race
      ORDER BY country_name, total_stops DESC
      LIMIT 100",
    Insight::StopsByViolation => "
      SELECT violation, COUNT(*) AS count
      FROM traffic_stops
      WHERE violation != 'Unknown'
      GROUP BY violation
      ORDER BY count DESC, violation",
    Insight::StopsByCountry => "
      SELECT country_name, COUNT(*) AS count
      FROM traffic_stops
      WHERE country_name != 'Unknown'
      GROUP BY country_name
      ORDER BY count DESC, country_name",
  }
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
  match value {
    ValueRef::Null => serde_json::Value::Null,
    ValueRef::Integer(i) => i.into(),
    ValueRef::Real(f) => serde_json::Number::from_f64(f)
      .map(serde_json::Value::Number)
      .unwrap_or(serde_json::Value::Null),
    ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned().into(),
    ValueRef::Blob(_) => serde_json::Value::Null,
  }
}

/// Run `insight` on `conn` and collect every row.
pub fn run(conn: &rusqlite::Connection, insight: Insight) -> rusqlite::Result<InsightTable> {
  let mut stmt = conn.prepare(sql(insight))?;
  let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
  let width = columns.len();

  let rows = stmt
    .query_map([], |row| {
      (0..width)
        .map(|i| row.get_ref(i).map(to_json))
        .collect::<rusqlite::Result<Vec<_>>>()
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(InsightTable { columns, rows })
}
