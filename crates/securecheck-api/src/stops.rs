//! Handlers for `/stops` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/stops` | Query params map to [`StopQuery`] fields |
//! | `POST` | `/stops` | Body: JSON array of cleaned [`StopRecord`]s; returns 201 |
//! | `GET`  | `/stops/summary` | Total stops, arrests, and searches |

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use securecheck_core::{
  stop::{StopQuery, StopRecord, StopSummary},
  store::{FlagStore, StopStore},
};
use serde::Serialize;

use crate::{ApiState, error::ApiError};

// ─── Search ──────────────────────────────────────────────────────────────────

/// `GET /stops[?country_name=...][&violation=...][&min_age=...][&vehicle_contains=...][&limit=...]`
pub async fn search<S>(
  State(state): State<ApiState<S>>,
  Query(query): Query<StopQuery>,
) -> Result<Json<Vec<StopRecord>>, ApiError>
where
  S: StopStore + FlagStore,
{
  if let (Some(min), Some(max)) = (query.min_age, query.max_age)
    && min > max
  {
    return Err(ApiError::BadRequest(format!("min_age {min} is above max_age {max}")));
  }

  let stops = state
    .store
    .search_stops(&query)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(stops))
}

// ─── Append ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Appended {
  pub appended: usize,
}

/// `POST /stops`: body is a JSON array of records.
pub async fn append<S>(
  State(state): State<ApiState<S>>,
  Json(records): Json<Vec<StopRecord>>,
) -> Result<impl IntoResponse, ApiError>
where
  S: StopStore + FlagStore,
{
  let appended = state
    .store
    .append_stops(records)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(Appended { appended })))
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// `GET /stops/summary`
pub async fn summary<S>(State(state): State<ApiState<S>>) -> Result<Json<StopSummary>, ApiError>
where
  S: StopStore + FlagStore,
{
  let summary = state
    .store
    .stop_summary()
    .await
    .map_err(ApiError::store)?;
  Ok(Json(summary))
}
