//! The [`KnowledgeStore`] trait: the durable state the engine owns.
//!
//! The trait is implemented by storage backends (e.g. `genekb-store-sqlite`).
//! The engine and the API depend on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use crate::{
  annotation::{Annotation, RevertOutcome},
  audit::{AuditEvent, AuditQuery, AuditStats, NewAuditEvent},
  genotype::GenotypeRecord,
  history::{NewQueryHistory, QueryHistoryEntry},
};

/// Annotations, the audit log, and query history.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait KnowledgeStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Annotations ───────────────────────────────────────────────────────

  /// The annotation for `rsid`, if one exists.
  fn get_annotation<'a>(
    &'a self,
    rsid: &'a str,
  ) -> impl Future<Output = Result<Option<Annotation>, Self::Error>> + Send + 'a;

  /// Insert or overwrite the annotation for `annotation.rsid` and return the
  /// stored row.
  ///
  /// When a snpedia-sourced annotation is overwritten by a non-snpedia one,
  /// the old row is retained as the revert baseline. The write is atomic.
  fn upsert_annotation(
    &self,
    annotation: Annotation,
  ) -> impl Future<Output = Result<Annotation, Self::Error>> + Send + '_;

  /// Restore the retained baseline, or remove the row when there is none.
  fn revert_annotation<'a>(
    &'a self,
    rsid: &'a str,
  ) -> impl Future<Output = Result<RevertOutcome, Self::Error>> + Send + 'a;

  /// Annotated SNPs on file with `magnitude >= min_magnitude`, highest first.
  fn notable_annotations(
    &self,
    min_magnitude: f64,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Annotation>, Self::Error>> + Send + '_;

  fn annotation_count(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// A random sample of called genotypes that have no annotation yet.
  fn unannotated_sample(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<GenotypeRecord>, Self::Error>> + Send + '_;

  // ── Audit log: append-only ───────────────────────────────────────────

  /// Append an event and return it with its assigned id and timestamp.
  fn append_event(
    &self,
    event: NewAuditEvent,
  ) -> impl Future<Output = Result<AuditEvent, Self::Error>> + Send + '_;

  fn get_event(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<AuditEvent>, Self::Error>> + Send + '_;

  /// Events matching `query`, newest first.
  fn query_events<'a>(
    &'a self,
    query: &'a AuditQuery,
  ) -> impl Future<Output = Result<Vec<AuditEvent>, Self::Error>> + Send + 'a;

  fn event_stats(&self) -> impl Future<Output = Result<AuditStats, Self::Error>> + Send + '_;

  // ── Query history ─────────────────────────────────────────────────────

  fn record_query(
    &self,
    entry: NewQueryHistory,
  ) -> impl Future<Output = Result<QueryHistoryEntry, Self::Error>> + Send + '_;

  fn get_query(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<QueryHistoryEntry>, Self::Error>> + Send + '_;

  /// Most recent entries first.
  fn list_queries(
    &self,
    limit: usize,
    include_hidden: bool,
  ) -> impl Future<Output = Result<Vec<QueryHistoryEntry>, Self::Error>> + Send + '_;

  /// Returns `false` when no entry has that id.
  fn set_query_hidden(
    &self,
    id: i64,
    hidden: bool,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
