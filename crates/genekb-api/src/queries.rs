//! Handlers for natural-language queries and their history.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/query` | Body: `{"query":"…"}` |
//! | `GET`  | `/history` | Optional `?limit=&include_hidden=true` |
//! | `POST` | `/history/:id/hidden` | Body: `{"hidden":true}`; 204 |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use genekb_core::{
  history::QueryHistoryEntry,
  reasoning::ReasoningService,
  reference::ReferenceService,
};
use genekb_engine::{Engine, EngineStore, query::QueryResult};
use serde::Deserialize;

use crate::error::ApiError;

const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct QueryBody {
  pub query: String,
}

/// `POST /query`
pub async fn ask<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
  Json(body): Json<QueryBody>,
) -> Result<Json<QueryResult>, ApiError>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  Ok(Json(engine.query(&body.query).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HistoryParams {
  pub limit:          Option<usize>,
  pub include_hidden: bool,
}

/// `GET /history`
pub async fn history<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<QueryHistoryEntry>>, ApiError>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
  Ok(Json(engine.history(limit, params.include_hidden).await?))
}

#[derive(Debug, Deserialize)]
pub struct HiddenBody {
  pub hidden: bool,
}

/// `POST /history/:id/hidden`
pub async fn set_hidden<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
  Path(id): Path<i64>,
  Json(body): Json<HiddenBody>,
) -> Result<StatusCode, ApiError>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  engine.set_history_hidden(id, body.hidden).await?;
  Ok(StatusCode::NO_CONTENT)
}
