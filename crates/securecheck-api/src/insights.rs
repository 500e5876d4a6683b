//! Handlers for `/insights` endpoints.

use axum::{
  Json,
  extract::{Path, State},
};
use securecheck_core::{
  insight::{Insight, InsightEntry, InsightTable},
  store::{FlagStore, StopStore},
};

use crate::{ApiState, error::ApiError};

/// `GET /insights`: every available report.
pub async fn list() -> Json<Vec<InsightEntry>> { Json(Insight::catalogue()) }

/// `GET /insights/{slug}`, 404 for an unknown slug.
pub async fn run<S>(
  State(state): State<ApiState<S>>,
  Path(slug): Path<String>,
) -> Result<Json<InsightTable>, ApiError>
where
  S: StopStore + FlagStore,
{
  let insight = Insight::from_slug(&slug)?;
  let table = state
    .store
    .run_insight(insight)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(table))
}
