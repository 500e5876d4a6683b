//! `POST /detect` and the lock-guarded pass runner shared with the scheduler.

use axum::{Json, extract::State};
use securecheck_core::{
  detect::{DetectionPass, PassReport},
  store::{FlagStore, StopStore},
};

use crate::{ApiState, error::ApiError};

/// Run one detection pass while holding `state.detect_lock`.
///
/// A caller that arrives mid-pass waits for it to finish and then runs its
/// own pass.
pub async fn run_locked<S>(state: &ApiState<S>) -> securecheck_core::Result<PassReport>
where
  S: StopStore + FlagStore,
{
  let _guard = state.detect_lock.lock().await;
  let mut pass = DetectionPass::new(state.store.as_ref(), &state.detection)?;
  Ok(pass.run().await)
}

/// `POST /detect`: returns the pass report.
pub async fn handler<S>(State(state): State<ApiState<S>>) -> Result<Json<PassReport>, ApiError>
where
  S: StopStore + FlagStore,
{
  let report = run_locked(&state).await?;
  Ok(Json(report))
}
