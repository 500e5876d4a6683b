//! JSON REST API for SecureCheck.
//!
//! Exposes an axum [`Router`] backed by any store implementing both
//! [`StopStore`] and [`FlagStore`]. Tracing, TLS, and transport concerns are
//! the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", securecheck_api::api_router(state.clone()))
//! ```

pub mod detect;
pub mod error;
pub mod flags;
pub mod insights;
pub mod stops;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use securecheck_core::{
  config::DetectionConfig,
  store::{FlagStore, StopStore},
};
use tokio::sync::Mutex;

pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:       Arc<S>,
  pub detection:   Arc<DetectionConfig>,
  /// Held for the duration of a detection pass so passes never overlap.
  pub detect_lock: Arc<Mutex<()>>,
}

impl<S> ApiState<S> {
  pub fn new(store: Arc<S>, detection: DetectionConfig) -> Self {
    Self {
      store,
      detection: Arc::new(detection),
      detect_lock: Arc::new(Mutex::new(())),
    }
  }
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:       Arc::clone(&self.store),
      detection:   Arc::clone(&self.detection),
      detect_lock: Arc::clone(&self.detect_lock),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: StopStore + FlagStore + 'static,
{
  Router::new()
    // Stops
    .route("/stops", get(stops::search::<S>).post(stops::append::<S>))
    .route("/stops/summary", get(stops::summary::<S>))
    // Insights
    .route("/insights", get(insights::list))
    .route("/insights/{slug}", get(insights::run::<S>))
    // Flags
    .route("/flags", get(flags::list::<S>))
    .route("/flags/{id}", get(flags::get_one::<S>))
    .route("/flags/{id}/resolve", post(flags::resolve_one::<S>))
    // Detection
    .route("/detect", post(detect::handler::<S>))
    .with_state(state)
}
