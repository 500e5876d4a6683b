//! Handlers for `/flags` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/flags` | `?status=unresolved\|resolved\|all`, default `unresolved` |
//! | `GET`  | `/flags/{id}` | 404 if not found |
//! | `POST` | `/flags/{id}/resolve` | Returns the [`Resolution`]; 404 if not found |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use securecheck_core::{
  flag::{Flag, FlagId, FlagStatus, Resolution},
  store::{FlagStore, StopStore},
};
use serde::Deserialize;

use crate::{ApiState, error::ApiError};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub status: FlagStatus,
}

/// `GET /flags[?status=<status>]`, newest first.
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Flag>>, ApiError>
where
  S: StopStore + FlagStore,
{
  let flags = state
    .store
    .list_flags(params.status)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(flags))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /flags/{id}`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<FlagId>,
) -> Result<Json<Flag>, ApiError>
where
  S: StopStore + FlagStore,
{
  let flag = state
    .store
    .get_flag(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("flag {id} not found")))?;
  Ok(Json(flag))
}

// ─── Resolve ─────────────────────────────────────────────────────────────────

/// `POST /flags/{id}/resolve`
///
/// Resolving an already-resolved flag succeeds with outcome
/// `already_resolved` and leaves the row untouched. Logging of the transition
/// happens in the store.
pub async fn resolve_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<FlagId>,
) -> Result<Json<Resolution>, ApiError>
where
  S: StopStore + FlagStore,
{
  let resolution = state
    .store
    .resolve(id)
    .await
    .map_err(ApiError::store)?;

  match resolution {
    Resolution::NotFound(id) => Err(securecheck_core::Error::FlagNotFound(id).into()),
    resolution => Ok(Json(resolution)),
  }
}
