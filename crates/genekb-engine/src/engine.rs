//! [`Engine`]: the single entry point the control surface talks to.

use std::sync::Arc;

use genekb_core::{
  annotation::{Annotation, RevertOutcome},
  audit::{AuditEvent, AuditQuery, AuditStats},
  citation::{Citation, CitationKind},
  genotype::{GenotypeRecord, GenotypeStore, normalize_rsid},
  history::QueryHistoryEntry,
  reasoning::ReasoningService,
  reference::ReferenceService,
};
use serde::{Deserialize, Serialize};

use crate::{
  EngineStore, Error, Result,
  activity::{ActivityStats, LogEntry},
  config::EngineConfig,
  discovery::{DiscoveryWorker, QueueSnapshot, StartOutcome},
  pipeline::{AnnotateOutcome, AnnotationEdit, Pipeline},
  pool::AnnotationPool,
  query::{QueryEngine, QueryResult},
};

/// Log entries included in [`EngineStatus`].
const STATUS_LOGS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
  pub running:             bool,
  pub stats:               ActivityStats,
  pub current_task:        Option<String>,
  pub recent_logs:         Vec<LogEntry>,
  /// Set when a configuration error halted discovery.
  pub last_error:          Option<String>,
  pub discovery_queue:     QueueSnapshot,
  pub pending_annotations: usize,
}

/// A genotype and whatever is known about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnpDetail {
  pub rsid:           String,
  pub genotype:       Option<GenotypeRecord>,
  pub annotation:     Option<Annotation>,
  pub interpretation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "lowercase")]
pub enum CitationTarget {
  Audit(AuditEvent),
  Query(QueryHistoryEntry),
}

pub struct Engine<S, R, F> {
  pipeline:  Pipeline<S, R, F>,
  pool:      Arc<AnnotationPool>,
  queries:   QueryEngine<S, R, F>,
  discovery: DiscoveryWorker<S, R, F>,
}

impl<S, R, F> Engine<S, R, F>
where
  S: EngineStore,
  R: ReasoningService + 'static,
  F: ReferenceService + 'static,
{
  /// Build the engine and spawn its annotation pool on the current runtime.
  /// Discovery stays stopped until [`Engine::start`].
  pub fn new(store: S, reasoning: R, references: F, config: EngineConfig) -> Self {
    let pool_workers = config.pool_workers;
    let pool_capacity = config.pool_capacity;
    let pipeline = Pipeline::new(store, reasoning, references, config);
    let pool = Arc::new(AnnotationPool::spawn(pipeline.clone(), pool_workers, pool_capacity));
    Self {
      queries: QueryEngine::new(pipeline.clone(), Arc::clone(&pool)),
      discovery: DiscoveryWorker::new(pipeline.clone()),
      pipeline,
      pool,
    }
  }

  pub fn store(&self) -> &S { self.pipeline.store() }

  // ── Status & activity ─────────────────────────────────────────────────────

  pub fn status(&self) -> EngineStatus {
    let activity = self.pipeline.activity();
    EngineStatus {
      running:             self.discovery.is_running(),
      stats:               activity.stats(),
      current_task:        activity.current_task(),
      recent_logs:         activity.recent(STATUS_LOGS),
      last_error:          self.discovery.last_error(),
      discovery_queue:     self.discovery.queue(),
      pending_annotations: self.pool.pending(),
    }
  }

  pub fn get_logs(&self, limit: usize) -> Vec<LogEntry> { self.pipeline.activity().recent(limit) }

  /// Clears the in-memory activity log only; the audit log is untouched.
  pub fn clear_logs(&self) { self.pipeline.activity().clear() }

  // ── Discovery ─────────────────────────────────────────────────────────────

  pub async fn start(&self) -> Result<StartOutcome> { self.discovery.start().await }

  pub async fn stop(&self) -> Result<bool> { self.discovery.stop().await }

  pub fn reset_discovery(&self) { self.discovery.reset() }

  /// Queue a gene symbol for the discovery worker.
  pub fn seed_discovery(&self, symbol: &str) -> Result<bool> { self.discovery.enqueue(symbol, "user") }

  // ── Query & annotation ────────────────────────────────────────────────────

  pub async fn query(&self, text: &str) -> Result<QueryResult> { self.queries.query(text).await }

  pub async fn annotate(
    &self,
    rsid: &str,
    instructions: Option<&str>,
    force: bool,
  ) -> Result<AnnotateOutcome> {
    self.pipeline.annotate(rsid, instructions, force).await
  }

  pub async fn get_annotation(&self, rsid: &str) -> Result<SnpDetail> {
    let rsid = normalize_rsid(rsid)?;
    let store = self.pipeline.store();
    let genotype = GenotypeStore::get(store, &rsid).await.map_err(Error::store)?;
    let annotation = store.get_annotation(&rsid).await.map_err(Error::store)?;
    if genotype.is_none() && annotation.is_none() {
      return Err(Error::NotFound(format!("nothing known about {rsid}")));
    }
    let interpretation = match (&genotype, &annotation) {
      (Some(g), Some(a)) => a.interpretation_for(&g.genotype).map(str::to_owned),
      _ => None,
    };
    Ok(SnpDetail { rsid, genotype, annotation, interpretation })
  }

  pub async fn edit_annotation(&self, rsid: &str, edit: AnnotationEdit) -> Result<Annotation> {
    self.pipeline.edit(rsid, edit).await
  }

  pub async fn revert_annotation(&self, rsid: &str) -> Result<RevertOutcome> {
    self.pipeline.revert(rsid).await
  }

  // ── Audit log & history ───────────────────────────────────────────────────

  pub async fn audit(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
    self.pipeline.store().query_events(query).await.map_err(Error::store)
  }

  pub async fn audit_event(&self, id: i64) -> Result<AuditEvent> {
    self
      .pipeline
      .store()
      .get_event(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::NotFound(format!("audit event {id}")))
  }

  pub async fn audit_stats(&self) -> Result<AuditStats> {
    self.pipeline.store().event_stats().await.map_err(Error::store)
  }

  pub async fn resolve_citation(&self, citation: Citation) -> Result<CitationTarget> {
    let store = self.pipeline.store();
    let target = match citation.kind {
      CitationKind::Audit => store.get_event(citation.id).await.map_err(Error::store)?.map(CitationTarget::Audit),
      CitationKind::Query => store.get_query(citation.id).await.map_err(Error::store)?.map(CitationTarget::Query),
    };
    target.ok_or_else(|| Error::NotFound(format!("citation {citation}")))
  }

  pub async fn history(&self, limit: usize, include_hidden: bool) -> Result<Vec<QueryHistoryEntry>> {
    self
      .pipeline
      .store()
      .list_queries(limit, include_hidden)
      .await
      .map_err(Error::store)
  }

  pub async fn set_history_hidden(&self, id: i64, hidden: bool) -> Result<()> {
    let found = self
      .pipeline
      .store()
      .set_query_hidden(id, hidden)
      .await
      .map_err(Error::store)?;
    if found { Ok(()) } else { Err(Error::NotFound(format!("history entry {id}"))) }
  }

  // ── Lifecycle ─────────────────────────────────────────────────────────────

  /// Stop discovery and the annotation pool.
  pub async fn shutdown(&self) -> Result<()> {
    self.discovery.stop().await?;
    self.pool.shutdown().await;
    Ok(())
  }

  #[cfg(test)]
  pub(crate) fn discovery(&self) -> &DiscoveryWorker<S, R, F> { &self.discovery }
}
