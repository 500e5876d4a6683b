//! The catalogue of fixed analytical reports over the stop table.
//!
//! Backends map each [`Insight`] to a query; the result comes back as a
//! loosely-typed [`InsightTable`] because every report has its own columns.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator as _};

use crate::{Error, Result};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Insight {
  TopDrugRelatedVehicles,
  MostSearchedVehicles,
  ArrestRateByAgeGroup,
  GenderByCountry,
  SearchRateByRaceGender,
  StopsByHour,
  NightArrestRate,
  ViolationSearchArrestRates,
  YoungDriverViolations,
  RarelyEscalatedViolations,
  DrugStopRateByCountry,
  ArrestRateByCountryViolation,
  CountriesMostSearched,
  YearlyStopsByCountry,
  TopArrestViolations,
  ViolationsByAgeRace,
  StopsByPeriod,
  HighSearchArrestViolations,
  DemographicsByCountry,
  StopsByViolation,
  StopsByCountry,
}

impl Insight {
  pub fn title(self) -> &'static str {
    match self {
      Self::TopDrugRelatedVehicles => "Top 10 Drug-Related Vehicles",
      Self::MostSearchedVehicles => "Most Frequently Searched Vehicles",
      Self::ArrestRateByAgeGroup => "Driver Age Group with Highest Arrest Rate",
      Self::GenderByCountry => "Gender Distribution of Drivers Stopped by Country",
      Self::SearchRateByRaceGender => "Race and Gender Combination with Highest Search Rate",
      Self::StopsByHour => "Time of Day with Most Traffic Stops",
      Self::NightArrestRate => "Night Stops More Likely to Lead to Arrests?",
      Self::ViolationSearchArrestRates => "Violations Most Associated with Searches or Arrests",
      Self::YoungDriverViolations => "Violations Most Common Among Younger Drivers (<25)",
      Self::RarelyEscalatedViolations => "Violations That Rarely Result in Search or Arrest",
      Self::DrugStopRateByCountry => "Countries with Highest Rate of Drug-Related Stops",
      Self::ArrestRateByCountryViolation => "Arrest Rate by Country and Violation",
      Self::CountriesMostSearched => "Countries with Most Stops with Search Conducted",
      Self::YearlyStopsByCountry => "Yearly Breakdown of Stops and Arrests by Country",
      Self::TopArrestViolations => "Top 5 Violations with Highest Arrest Rates",
      Self::ViolationsByAgeRace => "Driver Violation Trends Based on Age and Race",
      Self::StopsByPeriod => "Time Period Analysis of Stops (Year, Month, Hour)",
      Self::HighSearchArrestViolations => "Violations with High Search and Arrest Rates",
      Self::DemographicsByCountry => "Driver Demographics by Country (Age, Gender, and Race)",
      Self::StopsByViolation => "Stops by Violation Type",
      Self::StopsByCountry => "Stops by Country",
    }
  }

  /// Parse a kebab-case slug such as `"stops-by-hour"`.
  pub fn from_slug(slug: &str) -> Result<Self> {
    slug.parse().map_err(|_| Error::UnknownInsight(slug.to_owned()))
  }

  pub fn catalogue() -> Vec<InsightEntry> {
    Self::iter()
      .map(|insight| InsightEntry {
        slug:  insight.to_string(),
        title: insight.title(),
      })
      .collect()
  }
}

/// One line of the catalogue listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsightEntry {
  pub slug:  String,
  pub title: &'static str,
}

/// Column names plus rows of JSON scalars.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightTable {
  pub columns: Vec<String>,
  pub rows:    Vec<Vec<serde_json::Value>>,
}

impl InsightTable {
  /// Index of `name` in [`Self::columns`].
  pub fn column(&self, name: &str) -> Option<usize> {
    self.columns.iter().position(|c| c == name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slugs_parse_back() {
    for entry in Insight::catalogue() {
      let parsed = Insight::from_slug(&entry.slug).unwrap();
      assert_eq!(parsed.title(), entry.title);
    }
    assert_eq!(Insight::StopsByHour.to_string(), "stops-by-hour");
  }

  #[test]
  fn dashboard_counts_are_in_the_catalogue() {
    let slugs: Vec<_> = Insight::catalogue().into_iter().map(|e| e.slug).collect();
    assert_eq!(slugs.len(), 21);
    for slug in ["stops-by-violation", "stops-by-country", "stops-by-period"] {
      assert!(slugs.iter().any(|s| s == slug), "{slug} missing");
    }
  }

  #[test]
  fn unknown_slug_is_an_error() {
    assert!(matches!(
      Insight::from_slug("everything"),
      Err(Error::UnknownInsight(s)) if s == "everything"
    ));
  }
}
