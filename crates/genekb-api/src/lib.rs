//! JSON control surface for the genekb engine.
//!
//! Exposes an axum [`Router`] backed by a shared [`genekb_engine::Engine`].
//! Auth and TLS are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", genekb_api::api_router(engine.clone()))
//! ```

pub mod annotations;
pub mod audit;
pub mod control;
pub mod error;
pub mod queries;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use genekb_core::{reasoning::ReasoningService, reference::ReferenceService};
use genekb_engine::{Engine, EngineStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, R, F>(engine: Arc<Engine<S, R, F>>) -> Router<()>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  Router::new()
    // Engine & discovery
    .route("/status", get(control::status::<S, R, F>))
    .route("/discovery/start", post(control::start::<S, R, F>))
    .route("/discovery/stop", post(control::stop::<S, R, F>))
    .route("/discovery/reset", post(control::reset::<S, R, F>))
    .route("/discovery/seed", post(control::seed::<S, R, F>))
    .route("/logs", get(control::logs::<S, R, F>).delete(control::clear_logs::<S, R, F>))
    // Queries
    .route("/query", post(queries::ask::<S, R, F>))
    .route("/history", get(queries::history::<S, R, F>))
    .route("/history/{id}/hidden", post(queries::set_hidden::<S, R, F>))
    // Annotations
    .route(
      "/annotations/{rsid}",
      get(annotations::get_one::<S, R, F>).put(annotations::edit::<S, R, F>),
    )
    .route("/annotations/{rsid}/annotate", post(annotations::annotate::<S, R, F>))
    .route("/annotations/{rsid}/revert", post(annotations::revert::<S, R, F>))
    // Audit
    .route("/audit", get(audit::list::<S, R, F>))
    .route("/audit/stats", get(audit::stats::<S, R, F>))
    .route("/audit/{id}", get(audit::get_one::<S, R, F>))
    .route("/citations/{kind}/{id}", get(audit::resolve::<S, R, F>))
    .with_state(engine)
}

#[cfg(test)]
mod tests;
