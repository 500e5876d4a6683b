//! The SecureCheck server: configuration, router assembly, and the interval
//! scheduler that runs detection passes in the background.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use axum::Router;
use securecheck_api::{ApiState, api_router, detect::run_locked};
use securecheck_core::{
  config::DetectionConfig,
  store::{FlagStore, StopStore},
};
use securecheck_store_sqlite::StoreConfig;
use serde::Deserialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `securecheck.toml` and
/// `SECURECHECK_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                 String,
  #[serde(default = "default_port")]
  pub port:                 u16,
  /// Seconds between scheduled detection passes. `0` disables the scheduler.
  #[serde(default)]
  pub detect_interval_secs: u64,
  #[serde(default = "default_store")]
  pub store:                StoreConfig,
  #[serde(default)]
  pub detection:            DetectionConfig,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_store() -> StoreConfig { StoreConfig::new("securecheck.db") }

impl ServerConfig {
  /// Layer the optional TOML file at `path` under the environment.
  ///
  /// Nested keys use `__`, e.g. `SECURECHECK_STORE__PATH` or
  /// `SECURECHECK_DETECTION__REPEAT_VIOLATION__THRESHOLD`.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("SECURECHECK")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn detect_interval(&self) -> Option<Duration> {
    (self.detect_interval_secs > 0).then(|| Duration::from_secs(self.detect_interval_secs))
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// The API router with request tracing.
pub fn app<S>(state: ApiState<S>) -> Router
where
  S: StopStore + FlagStore + 'static,
{
  api_router(state).layer(TraceLayer::new_for_http())
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

/// Run a detection pass every `every`, starting immediately.
///
/// Shares `state.detect_lock` with `POST /detect`. A tick that falls due
/// while a pass is still running is skipped.
pub fn spawn_scheduler<S>(state: ApiState<S>, every: Duration) -> JoinHandle<()>
where
  S: StopStore + FlagStore + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(every_secs = every.as_secs(), "detection scheduler started");

    loop {
      ticker.tick().await;
      match run_locked(&state).await {
        Ok(report) => info!(inserted = report.inserted_count(), "scheduled detection pass"),
        Err(e) => error!(error = %e, "scheduled detection pass failed"),
      }
    }
  })
}
