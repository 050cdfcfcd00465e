//! genekb server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! knowledge base, and serves the JSON control surface over HTTP. Genotype
//! data is expected to already be present in the store.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use genekb_engine::{Engine, discovery::StartOutcome};
use genekb_server::Settings;
use genekb_store_sqlite::SqliteStore;
use genekb_upstream::{AnthropicClient, References};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "genekb annotation and discovery server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Start the discovery worker as soon as the server is up.
  #[arg(long)]
  autostart: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("GENEKB").separator("__"))
    .build()
    .context("failed to read config file")?;

  let settings: Settings = settings
    .try_deserialize()
    .context("failed to deserialise settings")?;
  let settings = settings.with_api_key_fallback(|var| std::env::var(var).ok());

  if settings.reasoning.api_key.is_none() {
    tracing::warn!(
      "no reasoning API key configured; queries and annotation will fail until one is set"
    );
  }

  let store_path = expand_tilde(&settings.server.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let reasoning = AnthropicClient::new(settings.reasoning.clone())
    .context("failed to build reasoning client")?;
  let references = References::from_config(&settings.references)
    .context("failed to build reference client")?;

  let engine = Arc::new(Engine::new(store, reasoning, references, settings.engine.clone()));

  if cli.autostart {
    match engine.start().await.context("failed to start discovery")? {
      StartOutcome::Started => tracing::info!("discovery worker started"),
      StartOutcome::AlreadyRunning => {}
    }
  }

  let app = genekb_server::app(Arc::clone(&engine));
  let address = format!("{}:{}", settings.server.host, settings.server.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  engine.shutdown().await.context("engine shutdown failed")?;
  tracing::info!("shut down cleanly");

  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!("failed to listen for ctrl-c: {e}");
    std::future::pending::<()>().await;
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
