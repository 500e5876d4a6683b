//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error renders as `{"error": "<display text>"}`.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  BadRequest(String),

  #[error("storage failure: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error(transparent)]
  Core(securecheck_core::Error),
}

impl ApiError {
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::Store(_) | Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<securecheck_core::Error> for ApiError {
  fn from(e: securecheck_core::Error) -> Self {
    use securecheck_core::Error as E;
    match e {
      E::FlagNotFound(id) => Self::NotFound(format!("flag {id} not found")),
      E::UnknownInsight(slug) => Self::NotFound(format!("no insight named {slug:?}")),
      other => Self::Core(other),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
