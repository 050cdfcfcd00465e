//! Handlers for engine status, the discovery worker, and the activity log.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/status` | |
//! | `POST`   | `/discovery/start` | `{"outcome":"started"\|"already_running"}` |
//! | `POST`   | `/discovery/stop` | `{"stopped":true}` when it was running |
//! | `POST`   | `/discovery/reset` | 204 |
//! | `POST`   | `/discovery/seed` | Body: `{"gene":"MTHFR"}` |
//! | `GET`    | `/logs` | Optional `?limit=` (default 100) |
//! | `DELETE` | `/logs` | 204; the audit log is untouched |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
};
use genekb_core::{reasoning::ReasoningService, reference::ReferenceService};
use genekb_engine::{
  Engine, EngineStatus, EngineStore, activity::LogEntry, discovery::StartOutcome,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

const DEFAULT_LOG_LIMIT: usize = 100;

// ─── Status ───────────────────────────────────────────────────────────────────

/// `GET /status`
pub async fn status<S, R, F>(State(engine): State<Arc<Engine<S, R, F>>>) -> Json<EngineStatus>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  Json(engine.status())
}

// ─── Discovery ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
  pub outcome: StartOutcome,
}

/// `POST /discovery/start`
pub async fn start<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
) -> Result<Json<StartResponse>, ApiError>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  let outcome = engine.start().await?;
  Ok(Json(StartResponse { outcome }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
  pub stopped: bool,
}

/// `POST /discovery/stop`
pub async fn stop<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
) -> Result<Json<StopResponse>, ApiError>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  let stopped = engine.stop().await?;
  Ok(Json(StopResponse { stopped }))
}

/// `POST /discovery/reset`
pub async fn reset<S, R, F>(State(engine): State<Arc<Engine<S, R, F>>>) -> StatusCode
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  engine.reset_discovery();
  StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct SeedBody {
  pub gene: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeedResponse {
  /// `false` when the gene was already queued or explored.
  pub queued: bool,
}

/// `POST /discovery/seed`
pub async fn seed<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
  Json(body): Json<SeedBody>,
) -> Result<Json<SeedResponse>, ApiError>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  let queued = engine.seed_discovery(&body.gene)?;
  Ok(Json(SeedResponse { queued }))
}

// ─── Logs ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LogParams {
  pub limit: Option<usize>,
}

/// `GET /logs[?limit=<n>]`
pub async fn logs<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
  Query(params): Query<LogParams>,
) -> Json<Vec<LogEntry>>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  Json(engine.get_logs(params.limit.unwrap_or(DEFAULT_LOG_LIMIT)))
}

/// `DELETE /logs`
pub async fn clear_logs<S, R, F>(State(engine): State<Arc<Engine<S, R, F>>>) -> StatusCode
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  engine.clear_logs();
  StatusCode::NO_CONTENT
}
