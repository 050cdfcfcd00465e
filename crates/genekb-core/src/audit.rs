//! Audit events: the append-only record of everything the engine does.
//!
//! The audit log doubles as the knowledge base that citation tokens resolve
//! against, so an event is never modified or removed once written.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

// ─── Enumerations ────────────────────────────────────────────────────────────

/// Which actor produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
  Snpedia,
  Claude,
  User,
  System,
  Discovery,
}

impl EventSource {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Snpedia => "snpedia",
      Self::Claude => "claude",
      Self::User => "user",
      Self::System => "system",
      Self::Discovery => "discovery",
    }
  }
}

impl FromStr for EventSource {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "snpedia" => Ok(Self::Snpedia),
      "claude" => Ok(Self::Claude),
      "user" => Ok(Self::User),
      "system" => Ok(Self::System),
      "discovery" => Ok(Self::Discovery),
      _ => Err(Error::UnknownVariant { kind: "event source", value: s.to_owned() }),
    }
  }
}

impl fmt::Display for EventSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// What kind of record an event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
  AnnotationImprovement,
  AnnotationEdit,
  AnnotationRevert,
  GeneDiscovery,
  Conversation,
  SearchQuery,
  WorkerStarted,
  WorkerStopped,
  Error,
}

impl DataType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::AnnotationImprovement => "annotation_improvement",
      Self::AnnotationEdit => "annotation_edit",
      Self::AnnotationRevert => "annotation_revert",
      Self::GeneDiscovery => "gene_discovery",
      Self::Conversation => "conversation",
      Self::SearchQuery => "search_query",
      Self::WorkerStarted => "worker_started",
      Self::WorkerStopped => "worker_stopped",
      Self::Error => "error",
    }
  }
}

impl FromStr for DataType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "annotation_improvement" => Ok(Self::AnnotationImprovement),
      "annotation_edit" => Ok(Self::AnnotationEdit),
      "annotation_revert" => Ok(Self::AnnotationRevert),
      "gene_discovery" => Ok(Self::GeneDiscovery),
      "conversation" => Ok(Self::Conversation),
      "search_query" => Ok(Self::SearchQuery),
      "worker_started" => Ok(Self::WorkerStarted),
      "worker_stopped" => Ok(Self::WorkerStopped),
      "error" => Ok(Self::Error),
      _ => Err(Error::UnknownVariant { kind: "data type", value: s.to_owned() }),
    }
  }
}

impl fmt::Display for DataType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// A persisted audit event. `id` is assigned by the store and increases
/// monotonically with every append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
  pub id:           i64,
  pub timestamp:    DateTime<Utc>,
  pub source:       EventSource,
  pub data_type:    DataType,
  /// The rsid or gene symbol the event is about, if any.
  pub reference_id: Option<String>,
  pub content:      String,
  pub metadata:     serde_json::Value,
}

/// Input to [`crate::store::KnowledgeStore::append_event`]. The id and
/// timestamp are always assigned by the store.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
  pub source:       EventSource,
  pub data_type:    DataType,
  pub reference_id: Option<String>,
  pub content:      String,
  pub metadata:     serde_json::Value,
}

impl NewAuditEvent {
  pub fn new(source: EventSource, data_type: DataType, content: impl Into<String>) -> Self {
    Self {
      source,
      data_type,
      reference_id: None,
      content: content.into(),
      metadata: serde_json::Value::Null,
    }
  }

  pub fn reference(mut self, reference_id: impl Into<String>) -> Self {
    self.reference_id = Some(reference_id.into());
    self
  }

  pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
    self.metadata = metadata;
    self
  }
}

// ─── Query types ─────────────────────────────────────────────────────────────

/// Filters for [`crate::store::KnowledgeStore::query_events`]. Results are
/// always newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditQuery {
  pub source:       Option<EventSource>,
  pub data_type:    Option<DataType>,
  pub reference_id: Option<String>,
  /// Substring match over `content`.
  pub search:       Option<String>,
  pub limit:        Option<usize>,
}

/// Event totals, grouped two ways.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStats {
  pub total:     u64,
  pub by_source: BTreeMap<String, u64>,
  pub by_type:   BTreeMap<String, u64>,
}
