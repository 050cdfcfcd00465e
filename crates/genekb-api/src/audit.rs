//! Handlers for the audit log and citation lookup.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET` | `/audit` | Optional `?source=&data_type=&reference_id=&search=&limit=` |
//! | `GET` | `/audit/stats` | Totals by source and data type |
//! | `GET` | `/audit/:id` | 404 if not found |
//! | `GET` | `/citations/:kind/:id` | `kind` is `audit` or `query` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use genekb_core::{
  audit::{AuditEvent, AuditQuery, AuditStats},
  citation::{Citation, CitationKind},
  reasoning::ReasoningService,
  reference::ReferenceService,
};
use genekb_engine::{CitationTarget, Engine, EngineStore};

use crate::error::ApiError;

/// `GET /audit`
pub async fn list<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
  Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEvent>>, ApiError>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  Ok(Json(engine.audit(&query).await?))
}

/// `GET /audit/stats`
pub async fn stats<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
) -> Result<Json<AuditStats>, ApiError>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  Ok(Json(engine.audit_stats().await?))
}

/// `GET /audit/:id`
pub async fn get_one<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
  Path(id): Path<i64>,
) -> Result<Json<AuditEvent>, ApiError>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  Ok(Json(engine.audit_event(id).await?))
}

/// `GET /citations/:kind/:id`
pub async fn resolve<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
  Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<CitationTarget>, ApiError>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  let kind: CitationKind = kind.parse().map_err(|e: genekb_core::Error| ApiError::BadRequest(e.to_string()))?;
  Ok(Json(engine.resolve_citation(Citation { kind, id }).await?))
}
