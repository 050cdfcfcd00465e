//! Engine tests against an in-memory SQLite store and scripted reasoning.

mod engine;

use std::{
  collections::HashMap,
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use genekb_core::{
  annotation::{Annotation, RevertOutcome},
  audit::{AuditEvent, AuditQuery, AuditStats, DataType, NewAuditEvent},
  genotype::{GenotypeRecord, GenotypeStore},
  history::{NewQueryHistory, QueryHistoryEntry},
  reasoning::{CompletionRequest, ModelTier, ReasoningError, ReasoningService},
  reference::{NoReferences, ReferenceService, ReferenceSubject},
  store::KnowledgeStore,
};
use genekb_store_sqlite::SqliteStore;

use crate::{Engine, EngineConfig, pipeline::Pipeline};

// ─── Fakes ───────────────────────────────────────────────────────────────────

type Script = dyn Fn(&CompletionRequest) -> Result<String, ReasoningError> + Send + Sync;

/// A reasoning service that answers from a closure and counts its calls.
pub struct ScriptedReasoning {
  script: Box<Script>,
  calls:  Arc<AtomicUsize>,
}

impl ScriptedReasoning {
  pub fn new(
    script: impl Fn(&CompletionRequest) -> Result<String, ReasoningError> + Send + Sync + 'static,
  ) -> (Self, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    (Self { script: Box::new(script), calls: Arc::clone(&calls) }, calls)
  }
}

impl ReasoningService for ScriptedReasoning {
  async fn complete(&self, request: &CompletionRequest) -> Result<String, ReasoningError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    (self.script)(request)
  }
}

/// A reasoning service that never answers in time.
pub struct SlowReasoning {
  pub delay: Duration,
  pub calls: Arc<AtomicUsize>,
}

impl ReasoningService for SlowReasoning {
  async fn complete(&self, _request: &CompletionRequest) -> Result<String, ReasoningError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(self.delay).await;
    Ok("{}".into())
  }
}

/// Scripted replies, with annotation replies held back for `delay`. Calls
/// are counted as soon as they start.
pub struct PacedReasoning {
  pub inner: ScriptedReasoning,
  pub delay: Duration,
}

impl ReasoningService for PacedReasoning {
  async fn complete(&self, request: &CompletionRequest) -> Result<String, ReasoningError> {
    let reply = self.inner.complete(request).await;
    if is_annotation_prompt(request) {
      tokio::time::sleep(self.delay).await;
    }
    reply
  }
}

/// Reference pages keyed by rsid or gene symbol.
#[derive(Default)]
pub struct PagedReferences {
  pages: HashMap<String, String>,
}

impl PagedReferences {
  pub fn with(mut self, subject: &str, page: &str) -> Self {
    self.pages.insert(subject.to_owned(), page.to_owned());
    self
  }
}

impl ReferenceService for PagedReferences {
  async fn fetch(&self, subject: ReferenceSubject<'_>) -> Option<String> {
    self.pages.get(&subject.to_string()).cloned()
  }
}

type StoreError = genekb_store_sqlite::Error;

/// A SQLite store whose writes or gene lookups can be made to fail.
#[derive(Clone)]
pub struct FaultyStore {
  pub inner:             SqliteStore,
  pub fail_upserts:      Arc<AtomicBool>,
  pub fail_gene_lookups: Arc<AtomicBool>,
}

impl FaultyStore {
  pub fn new(inner: SqliteStore) -> Self {
    Self { inner, fail_upserts: Arc::default(), fail_gene_lookups: Arc::default() }
  }

  fn injected(what: &str) -> StoreError { StoreError::OutOfRange(format!("injected {what} failure")) }
}

impl GenotypeStore for FaultyStore {
  type Error = StoreError;

  async fn get(&self, rsid: &str) -> Result<Option<GenotypeRecord>, StoreError> {
    GenotypeStore::get(&self.inner, rsid).await
  }

  async fn snps_for_gene(&self, gene: &str) -> Result<Vec<String>, StoreError> {
    if self.fail_gene_lookups.load(Ordering::SeqCst) {
      return Err(Self::injected("gene lookup"));
    }
    self.inner.snps_for_gene(gene).await
  }

  async fn count(&self) -> Result<u64, StoreError> { self.inner.count().await }
}

impl KnowledgeStore for FaultyStore {
  type Error = StoreError;

  async fn get_annotation(&self, rsid: &str) -> Result<Option<Annotation>, StoreError> {
    self.inner.get_annotation(rsid).await
  }

  async fn upsert_annotation(&self, annotation: Annotation) -> Result<Annotation, StoreError> {
    if self.fail_upserts.load(Ordering::SeqCst) {
      return Err(Self::injected("upsert"));
    }
    self.inner.upsert_annotation(annotation).await
  }

  async fn revert_annotation(&self, rsid: &str) -> Result<RevertOutcome, StoreError> {
    self.inner.revert_annotation(rsid).await
  }

  async fn notable_annotations(&self, min_magnitude: f64, limit: usize) -> Result<Vec<Annotation>, StoreError> {
    self.inner.notable_annotations(min_magnitude, limit).await
  }

  async fn annotation_count(&self) -> Result<u64, StoreError> { self.inner.annotation_count().await }

  async fn unannotated_sample(&self, limit: usize) -> Result<Vec<GenotypeRecord>, StoreError> {
    self.inner.unannotated_sample(limit).await
  }

  async fn append_event(&self, event: NewAuditEvent) -> Result<AuditEvent, StoreError> {
    self.inner.append_event(event).await
  }

  async fn get_event(&self, id: i64) -> Result<Option<AuditEvent>, StoreError> { self.inner.get_event(id).await }

  async fn query_events(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>, StoreError> {
    self.inner.query_events(query).await
  }

  async fn event_stats(&self) -> Result<AuditStats, StoreError> { self.inner.event_stats().await }

  async fn record_query(&self, entry: NewQueryHistory) -> Result<QueryHistoryEntry, StoreError> {
    self.inner.record_query(entry).await
  }

  async fn get_query(&self, id: i64) -> Result<Option<QueryHistoryEntry>, StoreError> {
    self.inner.get_query(id).await
  }

  async fn list_queries(&self, limit: usize, include_hidden: bool) -> Result<Vec<QueryHistoryEntry>, StoreError> {
    self.inner.list_queries(limit, include_hidden).await
  }

  async fn set_query_hidden(&self, id: i64, hidden: bool) -> Result<bool, StoreError> {
    self.inner.set_query_hidden(id, hidden).await
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

pub fn test_config() -> EngineConfig {
  EngineConfig {
    retry_delay_ms: 0,
    base_interval_ms: 10,
    max_interval_ms: 40,
    reasoning_timeout_ms: 5_000,
    ..Default::default()
  }
}

pub fn snp(rsid: &str, genotype: &str, gene: Option<&str>) -> GenotypeRecord {
  GenotypeRecord {
    rsid:       rsid.into(),
    chromosome: "1".into(),
    position:   1_000,
    genotype:   genotype.into(),
    gene:       gene.map(Into::into),
  }
}

pub async fn store_with(records: Vec<GenotypeRecord>) -> SqliteStore {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  store.insert_genotypes(records).await.expect("seed genotypes");
  store
}

pub fn is_annotation_prompt(request: &CompletionRequest) -> bool {
  request.prompt.starts_with("Write an annotation")
}

pub fn is_related_prompt(request: &CompletionRequest) -> bool { request.tier == ModelTier::Fast }

/// A valid annotation reply for whatever SNP the prompt is about.
pub fn annotation_reply(title: &str) -> String {
  format!(
    r#"{{"title": "{title}", "summary": "A well-studied variant.", "gene": null,
        "genotype_info": {{"CT": "One copy.", "CC": "Two copies."}},
        "categories": ["metabolism"], "magnitude": 2.5, "repute": "bad"}}"#
  )
}

pub fn pipeline_with<R: ReasoningService + 'static>(
  store: SqliteStore,
  reasoning: R,
  config: EngineConfig,
) -> Pipeline<SqliteStore, R, NoReferences> {
  Pipeline::new(store, reasoning, NoReferences, config)
}

pub fn engine_with<R: ReasoningService + 'static>(
  store: SqliteStore,
  reasoning: R,
) -> Engine<SqliteStore, R, NoReferences> {
  Engine::new(store, reasoning, NoReferences, test_config())
}

/// Poll until `done` holds, for at most two seconds.
pub async fn eventually<Fut>(mut done: impl FnMut() -> Fut)
where
  Fut: std::future::Future<Output = bool>,
{
  tokio::time::timeout(Duration::from_secs(2), async {
    while !done().await {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  })
  .await
  .expect("condition should hold within two seconds");
}

pub async fn events_of(store: &SqliteStore, data_type: DataType) -> Vec<AuditEvent> {
  store
    .query_events(&AuditQuery { data_type: Some(data_type), ..Default::default() })
    .await
    .expect("query events")
}

pub async fn all_events(store: &SqliteStore) -> Vec<AuditEvent> {
  store.query_events(&AuditQuery::default()).await.expect("query events")
}
