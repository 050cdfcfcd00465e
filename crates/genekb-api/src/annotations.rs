//! Handlers for `/annotations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/annotations/:rsid` | Genotype, annotation and personal interpretation |
//! | `PUT`  | `/annotations/:rsid` | Body: any of `title`, `summary`, `genotype_info` |
//! | `POST` | `/annotations/:rsid/annotate` | Body: `{"instructions":"…","force":true}`, both optional |
//! | `POST` | `/annotations/:rsid/revert` | Restore the reference baseline, or clear |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use genekb_core::{
  annotation::{Annotation, RevertOutcome},
  reasoning::ReasoningService,
  reference::ReferenceService,
};
use genekb_engine::{
  Engine, EngineStore, SnpDetail,
  pipeline::{AnnotateOutcome, AnnotationEdit},
};
use serde::Deserialize;

use crate::error::ApiError;

/// `GET /annotations/:rsid`
pub async fn get_one<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
  Path(rsid): Path<String>,
) -> Result<Json<SnpDetail>, ApiError>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  Ok(Json(engine.get_annotation(&rsid).await?))
}

/// `PUT /annotations/:rsid`
pub async fn edit<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
  Path(rsid): Path<String>,
  Json(body): Json<AnnotationEdit>,
) -> Result<Json<Annotation>, ApiError>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  Ok(Json(engine.edit_annotation(&rsid, body).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AnnotateBody {
  pub instructions: Option<String>,
  pub force:        bool,
}

/// `POST /annotations/:rsid/annotate`
pub async fn annotate<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
  Path(rsid): Path<String>,
  Json(body): Json<AnnotateBody>,
) -> Result<Json<AnnotateOutcome>, ApiError>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  let instructions = body.instructions.as_deref().map(str::trim).filter(|s| !s.is_empty());
  Ok(Json(engine.annotate(&rsid, instructions, body.force).await?))
}

/// `POST /annotations/:rsid/revert`
pub async fn revert<S, R, F>(
  State(engine): State<Arc<Engine<S, R, F>>>,
  Path(rsid): Path<String>,
) -> Result<Json<RevertOutcome>, ApiError>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  Ok(Json(engine.revert_annotation(&rsid).await?))
}
