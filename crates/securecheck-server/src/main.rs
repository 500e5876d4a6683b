//! securecheck server binary.
//!
//! Reads `securecheck.toml` (or the path given with `--config`), opens the
//! SQLite store, and either serves the JSON API or runs a one-shot command.
//!
//! ```text
//! securecheck                 # serve (default)
//! securecheck detect          # run one detection pass and print the report
//! securecheck resolve 17      # mark flag 17 resolved
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use securecheck_api::ApiState;
use securecheck_core::{detect::DetectionPass, flag::FlagId, store::FlagStore};
use securecheck_server::{ServerConfig, app, expand_tilde, spawn_scheduler};
use securecheck_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "SecureCheck traffic-stop detection server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "securecheck.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API, running detection on the configured interval.
  Serve,
  /// Run a single detection pass and print its report as JSON.
  Detect,
  /// Mark a flag resolved.
  Resolve {
    /// The flag's numeric id.
    id: i64,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let mut server_cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load config from {:?}", cli.config))?;
  server_cfg
    .detection
    .validate()
    .context("invalid detection configuration")?;

  // Expand `~` in store path.
  server_cfg.store.path = expand_tilde(&server_cfg.store.path);

  // Open SQLite store.
  let store = SqliteStore::open(&server_cfg.store)
    .await
    .with_context(|| format!("failed to open store at {:?}", server_cfg.store.path))?;

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(server_cfg, store).await,
    Command::Detect => {
      let report = DetectionPass::new(&store, &server_cfg.detection)?.run().await;
      println!("{}", serde_json::to_string_pretty(&report)?);
      Ok(())
    }
    Command::Resolve { id } => {
      let resolution = store
        .resolve(FlagId(id))
        .await
        .with_context(|| format!("failed to resolve flag {id}"))?;
      let flag = resolution.clone().into_result()?;
      tracing::info!(flag_id = %flag.flag_id, vehicle = %flag.vehicle_number, "resolved");
      println!("{}", serde_json::to_string_pretty(&resolution)?);
      Ok(())
    }
  }
}

async fn serve(server_cfg: ServerConfig, store: SqliteStore) -> anyhow::Result<()> {
  let state = ApiState::new(Arc::new(store), server_cfg.detection.clone());

  if let Some(every) = server_cfg.detect_interval() {
    spawn_scheduler(state.clone(), every);
  }

  let app = app(state);
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
