//! Wiring for the genekb server binary: configuration and the top-level
//! router.

use std::{path::PathBuf, sync::Arc};

use axum::Router;
use genekb_core::{reasoning::ReasoningService, reference::ReferenceService};
use genekb_engine::{Engine, EngineConfig, EngineStore};
use genekb_upstream::{ReasoningConfig, ReferenceConfig};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

/// Environment variable consulted when no API key is configured.
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `config.toml` and `GENEKB__*`
/// environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub server:     ServerConfig,
  pub reasoning:  ReasoningConfig,
  pub references: ReferenceConfig,
  pub engine:     EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_string(),
      port:       8000,
      store_path: PathBuf::from("~/.local/share/genekb/genekb.db"),
    }
  }
}

impl Settings {
  /// Fill in the API key from `lookup(API_KEY_VAR)` if none is configured.
  pub fn with_api_key_fallback(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
    let configured = self.reasoning.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
    if !configured {
      self.reasoning.api_key = lookup(API_KEY_VAR).filter(|k| !k.trim().is_empty());
    }
    self
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The API nested under `/api`, with request tracing.
pub fn app<S, R, F>(engine: Arc<Engine<S, R, F>>) -> Router
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  Router::new()
    .nest("/api", genekb_api::api_router(engine))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use genekb_core::reference::NoReferences;
  use genekb_store_sqlite::SqliteStore;
  use genekb_upstream::AnthropicClient;
  use tower::ServiceExt as _;

  #[test]
  fn empty_settings_use_defaults() {
    let settings: Settings = config::Config::builder()
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();
    assert_eq!(settings.server.port, 8000);
    assert_eq!(settings.engine, EngineConfig::default());
    assert!(settings.references.enabled);
    assert_eq!(settings.reasoning.api_key, None);
  }

  #[test]
  fn partial_sections_keep_remaining_defaults() {
    let toml = r#"
      [server]
      port = 9100

      [engine]
      max_candidates = 3
    "#;
    let settings: Settings = config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();
    assert_eq!(settings.server.port, 9100);
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.engine.max_candidates, 3);
    assert_eq!(settings.engine.pool_workers, EngineConfig::default().pool_workers);
  }

  #[test]
  fn api_key_falls_back_to_environment() {
    let settings = Settings::default()
      .with_api_key_fallback(|var| (var == API_KEY_VAR).then(|| "sk-test".to_string()));
    assert_eq!(settings.reasoning.api_key.as_deref(), Some("sk-test"));
  }

  #[test]
  fn configured_api_key_wins() {
    let mut settings = Settings::default();
    settings.reasoning.api_key = Some("from-file".into());
    let settings = settings.with_api_key_fallback(|_| Some("from-env".into()));
    assert_eq!(settings.reasoning.api_key.as_deref(), Some("from-file"));
  }

  #[tokio::test]
  async fn api_is_nested_under_prefix() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let reasoning = AnthropicClient::new(ReasoningConfig::default()).unwrap();
    let engine = Arc::new(Engine::new(store, reasoning, NoReferences, EngineConfig::default()));

    let req = Request::builder().uri("/api/status").body(Body::empty()).unwrap();
    let resp = app(Arc::clone(&engine)).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::builder().uri("/status").body(Body::empty()).unwrap();
    let resp = app(engine).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }
}
